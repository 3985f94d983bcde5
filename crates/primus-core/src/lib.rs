//! Primus Core - single-instance coordination for desktop applications.
//!
//! Every launch of an application starts a [`CoordinationEngine`]. The first
//! process to bind the well-known loopback address becomes the primary; later
//! launches connect to it, forward their command-line intent (open a file,
//! raise the window, replace or abort the running instance) and exit.
//!
//! # Example
//!
//! ```rust,ignore
//! use primus_core::{AppIdentity, CoordinationEngine, EngineConfig, InstanceState, Notification};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> primus_core::Result<()> {
//!     let args: Vec<String> = std::env::args().skip(1).collect();
//!     let (mut engine, mut notes) =
//!         CoordinationEngine::new(AppIdentity::current("editor"), EngineConfig::from_env()?)?;
//!
//!     engine.initialize(&args).await;
//!     tokio::spawn(async move {
//!         while let Some(Notification::Raised { arguments }) = notes.recv().await {
//!             println!("open {:?}", arguments);
//!         }
//!     });
//!
//!     if engine.run().await == InstanceState::Dead {
//!         // The primary instance already handled this launch.
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod identity;
pub mod transport;

pub use client::{Client, ClientEvent, ClientId, CommandSink};
pub use command::{Command, CommandKind, CommandOption, COMMAND_FRAME_TAG, COMMAND_VERSION};
pub use config::{EngineConfig, ServerConfig};
pub use engine::{CoordinationEngine, EngineHandle, InstanceState, Notification};
pub use error::{PrimusError, Result};
pub use flags::LaunchFlags;
pub use identity::AppIdentity;
pub use transport::{encode_frame, Frame, FrameDecoder};
