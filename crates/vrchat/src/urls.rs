//! Service asset-URL parsing.

/// Extracts the file id from a service asset URL.
///
/// Asset URLs take the shape `.../file/{id}/{version}/{subresource}` or end
/// with `/file/{id}`; image URLs carry the id as its own path segment. The
/// id is needed to reuse an existing file when re-uploading.
pub fn parse_file_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    while let Some(segment) = segments.next() {
        if segment == "file" {
            if let Some(id) = segments.next() {
                return Some(id.to_string());
            }
        } else if segment.starts_with("file_") {
            return Some(segment.to_string());
        }
    }
    None
}
