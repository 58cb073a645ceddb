//! Well-known tool name constants
//!
//! The tool-name space is open: any string is a valid tool name, and unknown
//! names are simply uncached until configured. These constants cover the
//! built-in tool set an agent runtime ships, so the default policies and the
//! default invalidation map agree on spelling.

// ============================================================================
// Tool Name Constants
// ============================================================================

/// Read tool name
pub const TOOL_READ: &str = "read";
/// Write tool name
pub const TOOL_WRITE: &str = "write";
/// Edit tool name
pub const TOOL_EDIT: &str = "edit";
/// Bash tool name
pub const TOOL_BASH: &str = "bash";
/// Glob tool name
pub const TOOL_GLOB: &str = "glob";
/// Grep tool name
pub const TOOL_GREP: &str = "grep";
/// Web fetch tool name
pub const TOOL_WEB_FETCH: &str = "web_fetch";
/// Web search tool name
pub const TOOL_WEB_SEARCH: &str = "web_search";
/// Subagent delegation tool name
pub const TOOL_TASK: &str = "task";

/// Normalize a tool name to its canonical constant, if it is a builtin
pub fn builtin_tool_name(name: &str) -> Option<&'static str> {
    match name {
        "read" => Some(TOOL_READ),
        "write" => Some(TOOL_WRITE),
        "edit" => Some(TOOL_EDIT),
        "bash" => Some(TOOL_BASH),
        "glob" => Some(TOOL_GLOB),
        "grep" => Some(TOOL_GREP),
        "web_fetch" => Some(TOOL_WEB_FETCH),
        "web_search" => Some(TOOL_WEB_SEARCH),
        "task" => Some(TOOL_TASK),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin_tool_name("read"), Some(TOOL_READ));
        assert_eq!(builtin_tool_name("web_fetch"), Some(TOOL_WEB_FETCH));
        assert_eq!(builtin_tool_name("my_plugin_tool"), None);
    }
}
