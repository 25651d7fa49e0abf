use std::path::PathBuf;

use crate::tag::TagError;

/// Require that an external tool is on PATH, returning its location.
pub fn require_tool(name: &str) -> Result<PathBuf, TagError> {
    which::which(name).map_err(|_| TagError::ToolNotAvailable {
        tool: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_tool_not_found() {
        let err = require_tool("nonexistent_tool_12345").unwrap_err();
        assert!(matches!(err, TagError::ToolNotAvailable { .. }));
    }
}
