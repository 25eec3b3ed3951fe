//! Password encodings per directory flavor

use crate::domain::DirectoryFlavor;
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha512};

/// `{SHA512}` + base64(SHA-512(plain)), the OpenLDAP `userPassword` scheme.
pub fn posix_password(plain: &str) -> String {
    let digest = Sha512::digest(plain.as_bytes());
    format!("{{SHA512}}{}", STANDARD.encode(digest))
}

/// UTF-16LE of the double-quoted password, as AD expects in `unicodePwd`.
pub fn active_directory_password(plain: &str) -> Vec<u8> {
    format!("\"{}\"", plain)
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// Attribute name and encoded value to replace for a password reset
pub fn password_modification(flavor: DirectoryFlavor, plain: &str) -> (&'static str, Vec<u8>) {
    match flavor {
        DirectoryFlavor::Posix => ("userPassword", posix_password(plain).into_bytes()),
        DirectoryFlavor::ActiveDirectory => ("unicodePwd", active_directory_password(plain)),
    }
}
