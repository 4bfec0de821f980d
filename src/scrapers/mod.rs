pub mod bilibili; // JSON metadata + protobuf comment segments
pub mod video_ref;

pub use bilibili::BilibiliClient;
pub use video_ref::{VideoId, VideoRef};
