//! WebSocket Protocol Types
//!
//! JSON frames are tagged by `type` and use the `namespace:event` names the
//! browser client listens for. Terminal bytes never go through JSON: they
//! travel as binary frames in both directions.

use serde::{Deserialize, Serialize};
use workspace_fs::{ChangeKind, FileTree};

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Terminal input sent as text instead of a binary frame
    #[serde(rename = "terminal:write")]
    TerminalWrite { data: String },
    #[serde(rename = "terminal:resize")]
    TerminalResize { rows: u16, cols: u16 },
    /// Persist `content` to `path`
    #[serde(rename = "file:change")]
    FileChange { path: String, content: String },
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full tree, sent once to a newly connected client
    #[serde(rename = "file:tree")]
    FileTree { tree: FileTree },
    /// Something under the workspace changed; clients re-fetch the tree.
    /// Both fields are absent when the client missed events.
    #[serde(rename = "file:refresh")]
    FileRefresh {
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ChangeKind>,
    },
    /// A `file:change` from this client was written
    #[serde(rename = "file:saved")]
    FileSaved { path: String },
    #[serde(rename = "terminal:restarted")]
    TerminalRestarted,
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            path: None,
        }
    }
}

/// One queued frame for a connection's sender task
#[derive(Debug)]
pub enum Outbound {
    /// Raw PTY output, sent as a binary frame
    Terminal(Vec<u8>),
    Message(ServerMessage),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_parsing() {
        let write: ClientMessage =
            serde_json::from_str(r#"{"type":"terminal:write","data":"ls\r"}"#).unwrap();
        assert_eq!(
            write,
            ClientMessage::TerminalWrite {
                data: "ls\r".into()
            }
        );

        let resize: ClientMessage =
            serde_json::from_str(r#"{"type":"terminal:resize","rows":30,"cols":120}"#).unwrap();
        assert_eq!(resize, ClientMessage::TerminalResize { rows: 30, cols: 120 });

        let change: ClientMessage =
            serde_json::from_str(r#"{"type":"file:change","path":"/a.txt","content":"x=1"}"#)
                .unwrap();
        assert_eq!(
            change,
            ClientMessage::FileChange {
                path: "/a.txt".into(),
                content: "x=1".into()
            }
        );
    }

    #[test]
    fn test_malformed_client_messages_fail() {
        for raw in [
            r#"{"type":"terminal:explode"}"#,
            r#"{"type":"file:change","path":"/a.txt"}"#,
            r#"{"type":"terminal:resize","rows":-1,"cols":80}"#,
            "not json",
        ] {
            assert!(serde_json::from_str::<ClientMessage>(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_server_message_shapes() {
        let mut tree = FileTree::new();
        tree.insert_file("a.txt");
        assert_eq!(
            serde_json::to_value(ServerMessage::FileTree { tree }).unwrap(),
            json!({ "type": "file:tree", "tree": { "a.txt": null } })
        );

        assert_eq!(
            serde_json::to_value(ServerMessage::FileRefresh {
                path: Some("src/a.js".into()),
                kind: Some(ChangeKind::Modify),
            })
            .unwrap(),
            json!({ "type": "file:refresh", "path": "src/a.js", "kind": "modify" })
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::FileRefresh {
                path: None,
                kind: None
            })
            .unwrap(),
            json!({ "type": "file:refresh" })
        );

        assert_eq!(
            serde_json::to_value(ServerMessage::TerminalRestarted).unwrap(),
            json!({ "type": "terminal:restarted" })
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::error("boom")).unwrap(),
            json!({ "type": "error", "message": "boom" })
        );
    }
}
