//! The record trait.

use bytemuck::Pod;

/// A fixed-size, plain-data object type the database can store.
///
/// Records are copied bit-for-bit between buffers and written to disk as raw
/// bytes, so they must be [`Pod`]: no pointers, no padding, no drop glue.
/// References to other objects are stored as [`ObjectId`](super::ObjectId).
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Unit {
///     location: [i32; 2],
///     ttl: u32,
///     _pad: u32,
///     spawner: ObjectId,
/// }
///
/// impl Record for Unit {
///     const TYPE_ID: u16 = 2;
///     const PERSIST_KEY: &'static str = "units";
/// }
/// ```
pub trait Record: Pod + Send + Sync + 'static {
    /// Unique type tag within one database.
    const TYPE_ID: u16;

    /// File name stem of this type's snapshot. Unique within one database.
    const PERSIST_KEY: &'static str;

    /// Size of one record in bytes.
    #[must_use]
    fn record_size() -> u32 {
        u32::try_from(std::mem::size_of::<Self>()).unwrap_or(u32::MAX)
    }
}
