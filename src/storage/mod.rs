/// Image storage module
///
/// This module handles:
/// - The on-disk picture and avatar cache (cache.rs)
/// - Read-through resolution across disk, database blobs and the network (resolver.rs)
/// - Decoding and scaling images for display (thumbnail.rs)

pub mod cache;
pub mod resolver;
pub mod thumbnail;
