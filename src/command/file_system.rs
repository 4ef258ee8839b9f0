use super::{decode_raw, decode_text, decode_unit, ClientResult, CommandDescriptor, ObcClient};
use anyhow::Context;

const LIST_FILES: CommandDescriptor<Vec<String>> =
    CommandDescriptor::new("listFiles {0}", decode_file_names);
const LIST_FILES_WITH_SIZES: CommandDescriptor<Vec<(String, u64)>> =
    CommandDescriptor::new("listFiles {0}", decode_file_sizes);
const WRITE_FILE: CommandDescriptor<usize> = CommandDescriptor::new("writeFile {0}", decode_count);
const READ_FILE: CommandDescriptor<Vec<u8>> = CommandDescriptor::new("readFile {0}", decode_raw);
const SYNC_FS: CommandDescriptor<()> = CommandDescriptor::new("sync_fs", decode_unit);
const ERASE: CommandDescriptor<()> = CommandDescriptor::new("erase {0}", decode_unit);
const REMOVE_FILE: CommandDescriptor<()> = CommandDescriptor::new("rm {0}", decode_unit);

/// The OBC's flash file system
pub trait FileSystem {
    fn list_files(&self, path: &str) -> ClientResult<Vec<String>>;
    fn list_files_with_sizes(&self, path: &str) -> ClientResult<Vec<(String, u64)>>;
    /// Returns the number of bytes the OBC reports as written
    fn write_file(&self, path: &str, content: &[u8]) -> ClientResult<usize>;
    fn read_file(&self, path: &str) -> ClientResult<Vec<u8>>;
    fn sync_fs(&self) -> ClientResult<()>;
    fn erase(&self, chip_index: u8) -> ClientResult<()>;
    fn remove_file(&self, path: &str) -> ClientResult<()>;
}

impl FileSystem for ObcClient {
    fn list_files(&self, path: &str) -> ClientResult<Vec<String>> {
        self.execute(&LIST_FILES, &[&path])
    }

    fn list_files_with_sizes(&self, path: &str) -> ClientResult<Vec<(String, u64)>> {
        self.execute(&LIST_FILES_WITH_SIZES, &[&path])
    }

    fn write_file(&self, path: &str, content: &[u8]) -> ClientResult<usize> {
        self.execute_with_data(&WRITE_FILE, &[&path], content)
    }

    fn read_file(&self, path: &str) -> ClientResult<Vec<u8>> {
        self.execute(&READ_FILE, &[&path])
    }

    fn sync_fs(&self) -> ClientResult<()> {
        self.execute(&SYNC_FS, &[])
    }

    fn erase(&self, chip_index: u8) -> ClientResult<()> {
        self.execute(&ERASE, &[&chip_index])
    }

    fn remove_file(&self, path: &str) -> ClientResult<()> {
        self.execute(&REMOVE_FILE, &[&path])
    }
}

/// One entry per line, `name\tsize`
fn listing_lines(payload: &[u8]) -> anyhow::Result<Vec<String>> {
    Ok(decode_text(payload)?.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
}

fn decode_file_names(payload: &[u8]) -> anyhow::Result<Vec<String>> {
    Ok(listing_lines(payload)?
        .into_iter()
        .map(|line| line.split('\t').next().unwrap_or_default().to_string())
        .collect())
}

fn decode_file_sizes(payload: &[u8]) -> anyhow::Result<Vec<(String, u64)>> {
    listing_lines(payload)?
        .into_iter()
        .map(|line| -> anyhow::Result<(String, u64)> {
            let (name, size) =
                line.split_once('\t').with_context(|| format!("No size in listing {line:?}"))?;
            let size = size.trim().parse().with_context(|| format!("Invalid size in {line:?}"))?;
            Ok((name.to_string(), size))
        })
        .collect()
}

fn decode_count(payload: &[u8]) -> anyhow::Result<usize> {
    let text = decode_text(payload)?;
    text.trim().parse().with_context(|| format!("Expected a byte count, got {text:?}"))
}
