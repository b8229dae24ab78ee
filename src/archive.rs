use std::io::{Cursor, Read};

use log::debug;
use zip::ZipArchive;

use crate::error::Result;

const LOG_EXTENSIONS: [&str; 2] = [".txt", ".log"];

fn is_log_member(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    LOG_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Returns the contents of the first `.txt`/`.log` member of a zip archive,
/// or `None` when the archive holds no such member.
pub fn first_log_member(archive: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;

    for index in 0..zip.len() {
        let mut file = zip.by_index(index)?;
        if file.is_dir() || !is_log_member(file.name()) {
            continue;
        }

        debug!("Extracting log member {}", file.name());
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        return Ok(Some(content));
    }

    Ok(None)
}
