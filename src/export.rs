use crate::flatten::{Column, FlatRow};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serialize `value` as pretty JSON, replacing any existing file at `path`.
pub fn write_json<T: Serialize + ?Sized, P: AsRef<Path>>(
    value: &T,
    path: P,
) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

pub fn write_rows_csv(writer: impl Write, columns: &[Column], rows: &[FlatRow]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(columns.iter().map(|c| c.name.as_str()))?;
    for row in rows {
        wtr.write_record(
            columns
                .iter()
                .map(|c| row.get(&c.id).map(|v| v.to_string()).unwrap_or_default()),
        )?;
    }
    wtr.flush().map_err(Into::into)
}

pub fn save_rows_csv<P: AsRef<Path>>(
    path: P,
    columns: &[Column],
    rows: &[FlatRow],
) -> csv::Result<()> {
    write_rows_csv(std::fs::File::create(path)?, columns, rows)
}

pub fn save_rows_json<P: AsRef<Path>>(path: P, rows: &[FlatRow]) -> std::io::Result<()> {
    write_json(rows, path)
}
