mod nonwriter;
mod recorder;

pub use nonwriter::NonWriter;
pub use recorder::Recorder;
