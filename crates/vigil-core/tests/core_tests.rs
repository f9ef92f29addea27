#[cfg(test)]
mod tests {
    use uuid::Uuid;
    use vigil_core::*;

    // ── Message tests ──────────────────────────────────────────

    #[test]
    fn test_message_text_constructor() {
        let sid = Uuid::new_v4();
        let msg = Message::text(sid, Role::User, "hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text_content(), "hello");
        assert!(msg.tool_calls.is_empty());
        assert_eq!(msg.session_id, sid);
    }

    #[test]
    fn test_message_text_joins_blocks() {
        let mut msg = Message::text(Uuid::nil(), Role::Assistant, "Hello ");
        msg.content.push(MessageContent::Text {
            text: "world".to_string(),
        });
        assert_eq!(msg.text_content(), "Hello \nworld");
    }

    #[test]
    fn test_tool_request_has_no_text() {
        let call = ToolCall {
            id: "call_1".into(),
            tool_name: "post_update".into(),
            arguments: serde_json::json!({"text": "hi"}),
        };
        let msg = Message::tool_request(Uuid::nil(), vec![call]);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text_content(), "");
        assert_eq!(msg.tool_calls.len(), 1);
    }

    #[test]
    fn test_tool_result_message_carries_error_flag() {
        let result = ToolResult::error("call_9", "[BLOCKED] Tool 'x' not allowed.");
        let msg = Message::tool_result(Uuid::nil(), &result);
        assert_eq!(msg.role, Role::Tool);
        match &msg.content[0] {
            MessageContent::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_call_id, "call_9");
                assert!(content.contains("BLOCKED"));
                assert!(*is_error);
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }

    #[test]
    fn test_estimate_tokens() {
        let msg = Message::text(Uuid::nil(), Role::User, "a".repeat(400));
        assert_eq!(msg.estimate_tokens(), 100);
    }

    #[test]
    fn test_message_serde_roundtrip() {
        let msg = Message::text(Uuid::new_v4(), Role::User, "test message");
        let json = serde_json::to_string(&msg).unwrap();
        let restored: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.role, Role::User);
        assert_eq!(restored.text_content(), "test message");
    }

    // ── Tier tests ─────────────────────────────────────────────

    #[test]
    fn test_tier_total_order() {
        assert!(ModelTier::Local < ModelTier::Cheap);
        assert!(ModelTier::Cheap < ModelTier::Mid);
        assert!(ModelTier::Mid < ModelTier::Premium);
        let mut sorted = ModelTier::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, ModelTier::ALL.to_vec());
    }

    #[test]
    fn test_tier_parse_and_display() {
        assert_eq!("mid".parse::<ModelTier>().unwrap(), ModelTier::Mid);
        assert_eq!("PREMIUM".parse::<ModelTier>().unwrap(), ModelTier::Premium);
        assert!("ultra".parse::<ModelTier>().is_err());
        assert_eq!(ModelTier::Cheap.to_string(), "cheap");
    }

    #[test]
    fn test_tier_serde_lowercase() {
        let json = serde_json::to_string(&ModelTier::Local).unwrap();
        assert_eq!(json, "\"local\"");
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_invalid_transition() {
        let err = VigilError::InvalidTransition {
            id: 7,
            from: "approved".into(),
            to: "rejected".into(),
        };
        let s = err.to_string();
        assert!(s.contains("#7"));
        assert!(s.contains("approved"));
        assert!(s.contains("rejected"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VigilError = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }
}
