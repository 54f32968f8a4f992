use serde::Serialize;

/// Progress of one publication, in emission order.
///
/// Events for a single publication are totally ordered in the sink channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// Publication started; the avatar record is being looked up.
    Init,
    /// The thumbnail image is uploading.
    Thumbnail,
    /// Waiting for platform payloads to become ready.
    Waiting,
    /// A platform bundle is uploading.
    #[serde(rename_all = "camelCase")]
    Bundle {
        part: u32,
        total_parts: u32,
        platform_index: u32,
        total_platforms: u32,
    },
    /// Every platform is published.
    Completed,
    /// The publication aborted.
    Error { message: String },
}
