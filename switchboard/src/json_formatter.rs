use dispatch::format::MediaTypeFormatter;
use hyper::body::Bytes;
use serde_json::Value;

/// The default formatter: JSON-encodes the result object.
pub struct JsonFormatter;

impl MediaTypeFormatter for JsonFormatter {
    fn supported_media_types(&self) -> &[&'static str] {
        &["application/json", "text/json"]
    }

    fn format(
        &self,
        obj: &Value,
        _media_type: &str,
    ) -> Result<Bytes, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Bytes::from(serde_json::to_vec(obj)?))
    }
}
