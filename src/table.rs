//! Uploaded tabular input.
//!
//! Cells are kept exactly as read so the download can reproduce every
//! original column.

use crate::error::Result;
use crate::types::{AccountRecord, AlignedBatch};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// A delimited text upload with a header row
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTable {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl UploadTable {
    pub fn new(headers: StringRecord, rows: Vec<StringRecord>) -> Self {
        Self { headers, rows }
    }

    /// Parse a table from any reader. Rows must match the header width.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let rows = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(columns = headers.len(), rows = rows.len(), "Upload parsed");

        Ok(Self { headers, rows })
    }

    pub fn from_path<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file, delimiter)
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pair each raw row with its aligned features.
    ///
    /// The batch must have been aligned from this table.
    pub fn records<'a>(
        &'a self,
        batch: &'a AlignedBatch,
    ) -> impl Iterator<Item = AccountRecord<'a>> + 'a {
        self.rows
            .iter()
            .zip(batch.iter_rows())
            .enumerate()
            .map(|(index, (fields, features))| AccountRecord {
                index,
                fields,
                features,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload() {
        let csv = "account_id,txn_count_30d,avg_txn_amount\nacc_1,12,40.5\nacc_2,3,\"1,200.0\"\n";
        let table = UploadTable::from_reader(csv.as_bytes(), b',').unwrap();

        assert_eq!(table.headers().iter().collect::<Vec<_>>(), vec!["account_id", "txn_count_30d", "avg_txn_amount"]);
        assert_eq!(table.len(), 2);
        assert_eq!(&table.rows()[1][2], "1,200.0");
    }

    #[test]
    fn test_header_only_upload_is_empty() {
        let table = UploadTable::from_reader("a,b\n".as_bytes(), b',').unwrap();
        assert!(table.is_empty());
        assert_eq!(table.headers().len(), 2);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = UploadTable::from_reader("a,b\n1,2\n3\n".as_bytes(), b',');
        assert!(result.is_err());
    }

    #[test]
    fn test_semicolon_delimiter() {
        let table = UploadTable::from_reader("a;b\n1;2\n".as_bytes(), b';').unwrap();
        assert_eq!(&table.rows()[0][1], "2");
    }
}
