use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathRejection {
    #[error("path '{path}' is not served (expected '{expected}')")]
    NotServed { path: String, expected: String },
}

/// Strips trailing slashes so `/srv` and `/srv/` compare equal. The root
/// path stays `/`.
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Validates the request path of an HTTP upgrade request.
///
/// - With no configured path every request path is accepted.
/// - Otherwise the request path (query excluded) must equal the configured
///   one, ignoring trailing slashes.
pub fn validate_path(request_path: &str, expected: Option<&str>) -> Result<(), PathRejection> {
    let Some(expected) = expected else {
        return Ok(());
    };

    if normalize(request_path) == normalize(expected) {
        return Ok(());
    }

    Err(PathRejection::NotServed {
        path: request_path.to_string(),
        expected: expected.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_path_allowed_without_configuration() {
        assert!(validate_path("/", None).is_ok());
        assert!(validate_path("/anything/else", None).is_ok());
    }

    #[test]
    fn exact_path_is_allowed() {
        assert!(validate_path("/srv", Some("/srv")).is_ok());
    }

    #[test]
    fn trailing_slash_is_ignored() {
        assert!(validate_path("/srv/", Some("/srv")).is_ok());
        assert!(validate_path("/srv", Some("/srv/")).is_ok());
        assert!(validate_path("/", Some("/")).is_ok());
    }

    #[test]
    fn other_paths_are_rejected() {
        match validate_path("/admin", Some("/srv")).unwrap_err() {
            PathRejection::NotServed { path, expected } => {
                assert_eq!(path, "/admin");
                assert_eq!(expected, "/srv");
            }
        }
        assert!(validate_path("/srv/extra", Some("/srv")).is_err());
        assert!(validate_path("/", Some("/srv")).is_err());
    }

    #[test]
    fn normalize_keeps_root() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("//"), "/");
        assert_eq!(normalize("/a//"), "/a");
    }
}
