//! EC2 error mapping

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use perconaflow_cloud::CloudError;

/// Wrap an SDK error with the name of the failing call
pub(crate) fn api_error<E>(operation: &str, err: E) -> CloudError
where
    E: std::error::Error + ProvideErrorMetadata,
{
    let message = match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        _ => DisplayErrorContext(&err).to_string(),
    };
    CloudError::api(operation, message)
}

/// EC2 codes meaning the object is already gone or was never there
pub(crate) fn is_not_found_code(code: &str) -> bool {
    code.ends_with(".NotFound") || code == "Gateway.NotAttached"
}

pub(crate) fn is_dependency_violation(code: &str) -> bool {
    code == "DependencyViolation"
}

/// `Ok(None)` when the call failed because the object does not exist
pub(crate) fn tolerate_not_found<T, E>(
    operation: &str,
    result: std::result::Result<T, E>,
) -> perconaflow_cloud::Result<Option<T>>
where
    E: std::error::Error + ProvideErrorMetadata,
{
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.code().is_some_and(is_not_found_code) => {
            tracing::debug!("{}: not found", operation);
            Ok(None)
        }
        Err(e) => Err(api_error(operation, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_codes() {
        assert!(is_not_found_code("InvalidVpcID.NotFound"));
        assert!(is_not_found_code("InvalidKeyPair.NotFound"));
        assert!(is_not_found_code("InvalidPermission.NotFound"));
        assert!(is_not_found_code("Gateway.NotAttached"));
        assert!(!is_not_found_code("DependencyViolation"));
        assert!(!is_not_found_code("UnauthorizedOperation"));
    }
}
