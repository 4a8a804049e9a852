//! PTY Manager - per-connection shell lifecycle
//!
//! Each session owns exactly one shell attached to a pseudo-terminal. Output is
//! delivered in order to the session's single listener, and a shell that exits
//! on its own is respawned after a backoff until the session is terminated.
//! The crate has no HTTP or WebSocket knowledge.
//!
//! # Example
//!
//! ```no_run
//! use pty_manager::{SessionConfig, SessionEvent, SessionManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SessionManager::new(SessionConfig::default());
//!
//!     let (session, mut events) = manager.create_session("conn-1".into()).await.unwrap();
//!     session.write(b"echo hello\n").await.unwrap();
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::Output(data) => print!("{}", String::from_utf8_lossy(&data)),
//!             SessionEvent::Exited { .. } => println!("shell exited, restarting"),
//!             SessionEvent::Restarted => println!("shell restarted"),
//!             SessionEvent::Failed(reason) => {
//!                 eprintln!("restart failed: {reason}");
//!                 break;
//!             }
//!         }
//!     }
//!
//!     manager.terminate(session.id()).await;
//! }
//! ```

mod error;
mod manager;
pub mod pty;
mod session;

pub use error::PtyError;
pub use manager::{SessionConfig, SessionManager};
pub use pty::{PtyActor, PtyConfig, PtyHandle, PtyOutput, PtyState};
pub use session::{Session, SessionEvent, SessionId, SessionState};
