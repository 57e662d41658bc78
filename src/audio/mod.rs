pub mod assembler;
pub mod backend;
pub mod file;
pub mod microphone;

pub use assembler::{downmix, FrameAssembler, LinearResampler};
pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource,
    BackendProvider, FrameSink,
};
pub use file::{write_wav, AudioFile, FileBackend};
pub use microphone::MicrophoneBackend;
