use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};

/// Request body read as JSON when the content type says so, otherwise as an
/// urlencoded form.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormOrJson<T>(pub T);

impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(&req) {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            return Ok(Self(value));
        }
        let Form(value) = Form::<T>::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        Ok(Self(value))
    }
}

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/// Form fields arrive as text; JSON clients may send numbers for the same field.
pub fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default, deserialize_with = "text_or_number")]
        count: String,
    }

    fn request(content_type: &str, body: String) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn reads_urlencoded_forms() {
        let req = request("application/x-www-form-urlencoded", "name=Ada&count=3".into());
        let FormOrJson(sample) = FormOrJson::<Sample>::from_request(req, &()).await.unwrap();
        assert_eq!(sample.name, "Ada");
        assert_eq!(sample.count, "3");
    }

    #[tokio::test]
    async fn reads_json_with_numbers() {
        let body = json!({ "name": "Ada", "count": 3 }).to_string();
        let req = request("application/json; charset=utf-8", body);
        let FormOrJson(sample) = FormOrJson::<Sample>::from_request(req, &()).await.unwrap();
        assert_eq!(sample.name, "Ada");
        assert_eq!(sample.count, "3");
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let req = request("application/json", "{".into());
        let res = FormOrJson::<Sample>::from_request(req, &()).await;
        assert!(res.is_err());
    }
}
