/// Delivery report: one row per task the pipeline dispatched.
///
/// Records are collected by the dispatcher in delivery order and can be
/// written out as CSV for offline inspection of the traversal order.
use crate::error::ReportError;
use crate::model::{ImageTask, Node, NodeKind, ProcessTask};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// A single dispatched task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// 1-based position in the delivery order.
    pub sequence: u64,
    pub node: u64,
    pub name: String,
    pub kind: NodeKind,
    pub image: u64,
    /// Module names, `;`-separated.
    pub modules: String,
    pub dispatched_at: DateTime<Local>,
}

impl DeliveryRecord {
    pub fn for_file(sequence: u64, task: &ProcessTask) -> Self {
        Self {
            sequence,
            node: task.file.id.0,
            name: task.file.name.to_string(),
            kind: task.file.kind,
            image: task.image().0,
            modules: join_names(task.context.modules.names()),
            dispatched_at: Local::now(),
        }
    }

    /// `image` is the image node when it could be read; only its name is used.
    pub fn for_image(sequence: u64, task: &ImageTask, image: Option<&Node>) -> Self {
        Self {
            sequence,
            node: task.image.0,
            name: image.map(|n| n.name.to_string()).unwrap_or_default(),
            kind: NodeKind::Image,
            image: task.image.0,
            modules: join_names(task.modules.names()),
            dispatched_at: Local::now(),
        }
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(";")
}

/// Write `records` as CSV with a header row.
pub fn write_csv<W: Write>(writer: W, records: &[DeliveryRecord]) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv_file(path: &Path, records: &[DeliveryRecord]) -> Result<(), ReportError> {
    let file = std::fs::File::create(path)?;
    write_csv(std::io::BufWriter::new(file), records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sequence: u64, name: &str, kind: NodeKind) -> DeliveryRecord {
        DeliveryRecord {
            sequence,
            node: sequence + 10,
            name: name.to_string(),
            kind,
            image: 0,
            modules: "file-types;name-index".to_string(),
            dispatched_at: Local::now(),
        }
    }

    #[test]
    fn test_csv_header_and_rows() {
        let records = vec![
            record(1, "disk.img", NodeKind::Image),
            record(2, "alice.txt", NodeKind::File),
        ];
        let mut out = Vec::new();
        write_csv(&mut out, &records).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "sequence,node,name,kind,image,modules,dispatched_at"
        );
        assert!(lines[1].starts_with("1,11,disk.img,image,0,file-types;name-index,"));
        assert!(lines[2].starts_with("2,12,alice.txt,file,0,"));
    }

    #[test]
    fn test_csv_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deliveries.csv");
        let records = vec![record(1, "a, b.txt", NodeKind::DerivedFile)];
        write_csv_file(&path, &records).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let back: Vec<DeliveryRecord> = rdr.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].name, "a, b.txt");
        assert_eq!(back[0].kind, NodeKind::DerivedFile);
    }
}
