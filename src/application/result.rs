//! Uniform command envelope

use serde::Serialize;

use crate::CatalogError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Conflict,
    NotFound,
}

/// Outcome of a command: success with an optional payload, or a business
/// failure with a single message.
#[derive(Clone, Debug, Serialize)]
pub struct CommandResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> CommandResult<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, message: None, failure: None, data: Some(data) }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()), failure: Some(kind), data: None }
    }

    pub fn is_success(&self) -> bool { self.success }
    pub fn data(&self) -> Option<&T> { self.data.as_ref() }
    pub fn into_data(self) -> Option<T> { self.data }

    /// Folds business failures into the envelope. Storage faults and
    /// cancellation stay errors for the caller.
    pub fn from_result(result: crate::Result<T>) -> crate::Result<Self> {
        match result {
            Ok(data) => Ok(Self::success(data)),
            Err(err) => match err.failure_kind() {
                Some(kind) => Ok(Self::failure(kind, err.to_string())),
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    #[test]
    fn test_business_failures_are_wrapped() {
        let result = CommandResult::<()>::from_result(Err(CatalogError::Conflict("Request is already approved".into()))).unwrap();
        assert!(!result.is_success());
        assert_eq!(result.failure, Some(FailureKind::Conflict));
        assert_eq!(result.message.as_deref(), Some("Request is already approved"));
    }

    #[test]
    fn test_faults_propagate() {
        let fault = CommandResult::<()>::from_result(Err(StoreError::Corrupt("bad status".into()).into()));
        assert!(matches!(fault, Err(CatalogError::Storage(_))));
        assert!(matches!(CommandResult::<()>::from_result(Err(CatalogError::Cancelled)), Err(CatalogError::Cancelled)));
    }

    #[test]
    fn test_success_serializes_without_message() {
        let json = serde_json::to_value(CommandResult::success(true)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": true}));
    }
}
