//! Shims to external collaborators
//!
//! The speech-transcription API, the booking calendar and invitation
//! delivery are opaque services. Each is reached through a small trait or
//! builder so the rest of the crate never depends on a concrete provider.

pub mod booking;
pub mod notify;
pub mod transcription;

pub use booking::booking_url;
pub use notify::{InvitationNotice, LogNotifier, Notifier};
pub use transcription::{
    transcribe_or_empty, DisabledTranscriber, HttpTranscriber, Transcriber, Transcript,
};
