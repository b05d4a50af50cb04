//! Test module for gatebar-core
//!
//! - Configuration loading, defaults and validation
//! - Login driver handshake and polling against a scripted service
//! - Process detection, launch, startup wait and termination
