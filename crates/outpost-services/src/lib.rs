//! outpost-services — dispatcher, dedup gate, prediction sender and cloud
//! bridge service logic.

pub mod artifacts;
pub mod bridge;
pub mod cloud;
pub mod detect_log;
pub mod dispatcher;
pub mod gate;
pub mod router;
pub mod sender;
pub mod upload;

pub use artifacts::ArtifactStore;
pub use bridge::{BridgeError, BridgeHandle, MqttBridge, Publication};
pub use cloud::CloudWorker;
pub use detect_log::DetectLog;
pub use dispatcher::Dispatcher;
pub use gate::DetectGate;
pub use router::MessageRouter;
pub use sender::{PredictionSender, SenderWorker};
pub use upload::FileUploader;
