/// File magic for `.mv2s` stores.
pub const MAGIC: [u8; 4] = *b"MV2S";
/// Magic trailer marker for every committed footer.
pub const FOOTER_MAGIC: [u8; 8] = *b"MV2SFOOT";
/// Magic prefix of the optional replay snapshot inside a header page.
pub const SNAPSHOT_MAGIC: [u8; 8] = *b"WALSNAP1";
/// Size of one header page; two copies live at offsets 0 and 4096.
pub const HEADER_SIZE: usize = 4096;
/// Binary format schema version stored in the header (`0x0100`).
pub const FORMAT_VERSION: u16 = 0x0100;
/// Specification major version.
pub const SPEC_MAJOR: u8 = 1;
/// Specification minor version.
pub const SPEC_MINOR: u8 = 0;

/// Embedded WAL ring begins immediately after the two header pages.
pub const WAL_OFFSET: u64 = 2 * HEADER_SIZE as u64;
/// Default WAL ring size for newly created stores.
pub const DEFAULT_WAL_SIZE: u64 = 256 * 1024 * 1024;
/// Minimal WAL size tier for throwaway/test stores.
pub const WAL_SIZE_TINY: u64 = 64 * 1024;
/// WAL size tier for small stores (<100 MB of content).
pub const WAL_SIZE_SMALL: u64 = 1024 * 1024;
/// WAL size tier for mid-sized stores.
pub const WAL_SIZE_MEDIUM: u64 = 4 * 1024 * 1024;

/// Fixed size of a WAL record header (sequence + length + flags + checksum).
pub const WAL_RECORD_HEADER_SIZE: u64 = 48;

/// Serialized TOCs may never exceed this many bytes.
pub const MAX_TOC_BYTES: u64 = 64 * 1024 * 1024;
/// A serialized TOC is at least its trailing checksum.
pub const MIN_TOC_BYTES: u64 = 32;
/// The backward footer scan inspects at most this much of the file tail.
pub const FOOTER_SCAN_WINDOW: u64 = 32 * 1024 * 1024;
/// Current table-of-contents schema version.
pub const TOC_VERSION: u64 = 1;

/// Maximum encoded string field size.
pub const MAX_STRING_BYTES: usize = 16 * 1024 * 1024;
/// Maximum encoded blob field size.
pub const MAX_BLOB_BYTES: usize = 256 * 1024 * 1024;
/// Maximum element count for any encoded array.
pub const MAX_ARRAY_ELEMENTS: usize = 10_000_000;

/// WAL occupancy percentage that triggers an internal commit.
pub const DEFAULT_AUTO_COMMIT_PCT: u8 = 25;

/// Canonical file suffix for store files.
pub const FILE_SUFFIX: &str = "mv2s";
