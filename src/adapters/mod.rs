// Adapters layer: ffmpeg/ffprobe/libvmaf process wrappers and the SampleEncoder built on them.

pub mod ffmpeg;
pub mod ffprobe;
pub mod sample_encoder;
pub mod vmaf;
