use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("operation not allowed on the background layer")]
    BaseLayerProtected,

    #[error("cannot delete the only remaining layer")]
    LastLayer,

    #[error("layer {0} not found")]
    LayerNotFound(u32),

    #[error("image {0} not found")]
    ImageNotFound(u32),

    #[error("placeholder {0} not found")]
    PlaceholderNotFound(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("unresolvable image reference: {reference}")]
    DataIntegrity { reference: String },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("network failure: {0}")]
    TransientNetwork(String),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CanvasError {
    /// Invariant violations are rejected as no-ops and shown to the user.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, CanvasError::BaseLayerProtected | CanvasError::LastLayer)
    }

    /// JSON shape the shell expects for a failed command.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}

pub type Result<T> = std::result::Result<T, CanvasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_json_carries_message() {
        let json: serde_json::Value = serde_json::from_str(&CanvasError::BaseLayerProtected.to_json()).unwrap();
        assert_eq!(json["error"], "operation not allowed on the background layer");
        assert!(CanvasError::LastLayer.is_invariant_violation());
        assert!(!CanvasError::ImageNotFound(3).is_invariant_violation());
    }
}
