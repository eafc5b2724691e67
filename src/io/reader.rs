use std::fs::File;
use std::io::{self, prelude::*};

/// Reads a file line by line into a reusable buffer.
pub struct BufReader {
    reader: io::BufReader<File>,
}

impl BufReader {
    /// Opens the file from the path into a reader.
    pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = io::BufReader::new(file);
        Ok(Self { reader })
    }

    /// Reads the next line into the buffer, clearing it first. Returns
    /// None at end of file.
    pub fn read_line<'buf>(
        &mut self,
        buffer: &'buf mut String,
    ) -> Option<io::Result<&'buf str>> {
        buffer.clear();
        self.reader
            .read_line(buffer)
            .map(|bytes| {
                if bytes == 0 {
                    None
                } else {
                    Some(buffer.trim_end())
                }
            })
            .transpose()
    }
}
