//! Zipped activity files
//!
//! Watch and platform exports often wrap each activity file in a zip archive.
//! [`activity_bytes`] passes plain files through untouched and unpacks the
//! first activity entry of an archive.

use crate::error::Rejection;
use std::borrow::Cow;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

/// Local file header signature that opens every zip archive
const ZIP_SIGNATURE: &[u8; 4] = b"PK\x03\x04";

/// Extension of activity entries inside an archive
pub const ACTIVITY_EXTENSION: &str = "fit";

/// Extension of archive inputs
pub const ARCHIVE_EXTENSION: &str = "zip";

pub fn is_archive(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_SIGNATURE)
}

/// The activity file carried by `bytes`, unpacking it if `bytes` is a zip archive.
pub fn activity_bytes(bytes: &[u8]) -> Result<Cow<'_, [u8]>, Rejection> {
    if !is_archive(bytes) {
        return Ok(Cow::Borrowed(bytes));
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(unreadable)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(unreadable)?;
        if !entry.is_file() || !has_extension(entry.name(), ACTIVITY_EXTENSION) {
            continue;
        }

        let mut out = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut out)
            .map_err(|e| Rejection::UnreadableArchive(e.to_string()))?;
        debug!(entry = entry.name(), bytes = out.len(), "activity unpacked from archive");
        return Ok(Cow::Owned(out));
    }
    Err(Rejection::ArchiveWithoutActivity)
}

/// Case-insensitive extension check on a file or entry name
pub fn has_extension(name: &str, extension: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(extension))
}

fn unreadable(err: zip::result::ZipError) -> Rejection {
    Rejection::UnreadableArchive(err.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decoder::fixture::{activity_file, ActivitySpec};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    /// Zip `entries` (name, contents) in order
    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_plain_file_is_borrowed() {
        let fit = activity_file(&ActivitySpec::default());
        let bytes = activity_bytes(&fit).unwrap();
        assert!(matches!(bytes, Cow::Borrowed(_)));
        assert_eq!(&*bytes, &fit[..]);
    }

    #[test]
    fn test_first_activity_entry_is_unpacked() {
        let fit = activity_file(&ActivitySpec::default());
        let other = activity_file(&ActivitySpec {
            sport: 1,
            ..ActivitySpec::default()
        });
        let archive = zip_bytes(&[
            ("notes.txt", &b"not an activity"[..]),
            ("12345_ACTIVITY.FIT", &fit[..]),
            ("second.fit", &other[..]),
        ]);

        assert!(is_archive(&archive));
        assert_eq!(&*activity_bytes(&archive).unwrap(), &fit[..]);
    }

    #[test]
    fn test_archive_without_activity() {
        let archive = zip_bytes(&[("readme.txt", &b"empty export"[..])]);
        let err = activity_bytes(&archive).unwrap_err();
        assert_eq!(err, Rejection::ArchiveWithoutActivity);
        assert_eq!(err.code(), "archive_without_activity");
    }

    #[test]
    fn test_damaged_archive_is_rejected() {
        let mut damaged = ZIP_SIGNATURE.to_vec();
        damaged.extend_from_slice(&[0u8; 16]);
        let err = activity_bytes(&damaged).unwrap_err();
        assert!(matches!(err, Rejection::UnreadableArchive(_)));
        assert_eq!(err.code(), "unreadable_archive");
    }

    #[test]
    fn test_extension_check() {
        assert!(has_extension("ride.FIT", ACTIVITY_EXTENSION));
        assert!(has_extension("export.zip", ARCHIVE_EXTENSION));
        assert!(!has_extension("fit", ACTIVITY_EXTENSION));
        assert!(!has_extension("ride.fit.txt", ACTIVITY_EXTENSION));
    }
}
