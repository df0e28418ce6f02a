use serde::Deserialize;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    /// Raw format tags; validated by the orchestrator.
    pub formats: Vec<String>,
    #[serde(default = "empty_object")]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub format: String,
    #[serde(default = "empty_object")]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CompleteJobBody {
    pub result_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct FailJobBody {
    pub error: String,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}
