//! CRC32C (Castagnoli) checksum.
//!
//! Used for both WAL entry checksums and transport envelope checksums.
//! Polynomial `0x1EDC6F41`, reversed representation `0x82F63B78`, initial
//! value `0xFFFFFFFF`, output complemented. The standard Castagnoli CRC-32C
//! as implemented by the `crc32c` crate (hardware-accelerated via SSE4.2/ARMv8
//! CRC extensions where available, falling back to a software table).

/// Computes the CRC32C checksum of `data`.
pub fn crc32c(data: &[u8]) -> u32 {
    ::crc32c::crc32c(data)
}
