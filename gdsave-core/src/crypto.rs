/// Single-byte XOR obfuscation applied to encoded save containers

/// XOR key the game applies to every byte of a save file on disk
pub const XOR_KEY: u8 = 11;

/// XORs every byte with the given key
///
/// The transform is its own inverse: applying it twice with the same key
/// returns the original bytes. This is obfuscation, not encryption - it
/// only keeps the base64 text from being directly readable on disk.
pub fn xor_bytes(data: &[u8], key: u8) -> Vec<u8> {
    data.iter().map(|b| b ^ key).collect()
}
