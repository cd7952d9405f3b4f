use serde_json::json;
use weft_api::{
    CorrelationKey, CreatorMessage, SessionId, StreamMessage, ThrownError, WorkerKind,
    WorkerMessage,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_keys_are_unique() {
        let a = CorrelationKey::new();
        let b = CorrelationKey::new();
        assert_ne!(a, b);
        assert_eq!(a, CorrelationKey::from(*a.as_uuid()));
    }

    #[test]
    fn test_only_call_responses_carry_a_key() {
        let key = CorrelationKey::new();
        let answered = WorkerMessage::CallReturn {
            key,
            value: json!(3),
        };
        let failed = WorkerMessage::CallError {
            key,
            error: ThrownError::task_not_found("sum"),
        };
        assert_eq!(answered.correlation_key(), Some(key));
        assert_eq!(failed.correlation_key(), Some(key));
        assert_eq!(WorkerMessage::TaskReturn(json!(3)).correlation_key(), None);
        assert_eq!(WorkerMessage::Initialized.correlation_key(), None);
    }

    #[test]
    fn test_message_kinds() {
        assert_eq!(WorkerMessage::Exit { code: 1 }.kind(), "Exit");
        assert_eq!(
            WorkerMessage::WorkerException(ThrownError::panicked("x")).kind(),
            "WorkerException"
        );
        assert_eq!(
            CreatorMessage::Terminate { code: None }.kind(),
            "Terminate"
        );
        assert_eq!(
            CreatorMessage::MessengerTransfer {
                name: "news".to_string()
            }
            .kind(),
            "MessengerTransfer"
        );
    }

    #[test]
    fn test_worker_kind() {
        let task = WorkerKind::Task {
            name: "add".to_string(),
            params: vec![json!(1), json!(2)],
        };
        assert!(!task.is_service());
        assert_eq!(task.label(), "task");
        assert!(WorkerKind::Service.is_service());
        assert_eq!(WorkerKind::Service.label(), "service");
    }

    #[test]
    fn test_messages_serialize() {
        let key = CorrelationKey::new();
        let call = CreatorMessage::Call {
            key,
            task: "add".to_string(),
            params: vec![json!(1)],
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["Call"]["task"], "add");
        assert_eq!(value["Call"]["key"], json!(key.to_string()));

        let back: CreatorMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn test_stream_messages_carry_their_session() {
        let id = SessionId::new();
        let messages = [
            StreamMessage::Start {
                id,
                metadata: json!({}),
            },
            StreamMessage::Ready { id },
            StreamMessage::Chunk {
                id,
                bytes: b"abc".to_vec(),
            },
            StreamMessage::End { id },
        ];
        let kinds: Vec<_> = messages.iter().map(StreamMessage::kind).collect();
        assert_eq!(kinds, ["Start", "Ready", "Chunk", "End"]);
        assert!(messages.iter().all(|message| message.id() == id));
    }
}
