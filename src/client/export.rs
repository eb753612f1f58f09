use super::ClientError;
use crate::messages::BatchRecord;
use std::{fs::File, io::BufWriter, path::Path};

pub const CSV_HEADER: [&str; 4] = ["Image", "Analysis", "Time (s)", "Timestamp"];

/// Placeholder written when a record has no inference time.
pub const MISSING_TIME: &str = "N/A";

/// Writes `records` as a pretty-printed JSON array, replacing `path`.
pub fn write_json(records: &[BatchRecord], path: &Path) -> Result<(), ClientError> {
    let file = File::create(path).map_err(|source| ClientError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), records)?;
    Ok(())
}

/// Writes one header row plus one row per record, replacing `path`.
pub fn write_csv(records: &[BatchRecord], path: &Path) -> Result<(), ClientError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for record in records {
        let time = record
            .result
            .inference_time
            .map(|t| t.to_string())
            .unwrap_or_else(|| MISSING_TIME.to_string());
        writer.write_record([
            record.image.as_str(),
            record.result.analysis.as_deref().unwrap_or_default(),
            time.as_str(),
            record.timestamp.to_rfc3339().as_str(),
        ])?;
    }
    writer.flush().map_err(|source| ClientError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::AnalysisResult;
    use chrono::Utc;

    fn record(image: &str, analysis: &str, time: Option<f64>) -> BatchRecord {
        let mut result = AnalysisResult::completed("m", analysis.to_string(), 1.5);
        result.inference_time = time;
        BatchRecord {
            image: image.to_string(),
            result,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn csv_quotes_embedded_commas_and_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(
            &[
                record("a.png", "red, mostly\nsquare", Some(0.5)),
                record("b.png", "blue", None),
            ],
            &path,
        )
        .unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<_> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(header, CSV_HEADER);
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "red, mostly\nsquare");
        assert_eq!(&rows[0][2], "0.5");
        assert_eq!(&rows[1][2], MISSING_TIME);
    }
}
