//! CSV import of readings and export of rollups.
//!
//! Imported files carry one reading per row with the header
//! `sensor,quantity,timestamp,value,unit`, where `timestamp` is RFC 3339.
//! Exported rollups use the same camelCase field names as the JSON output.

use std::io::{Read, Write};

use serde::Serialize;
use tracing::{info, warn};

use paddock_types::Reading;

use crate::error::Result;
use crate::queries::RollupQuery;
use crate::store::{Store, validate_reading};

/// Rows read per insert transaction during import.
const IMPORT_BATCH: usize = 1_000;

/// Outcome of a CSV import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    /// Data rows read from the file.
    pub rows: usize,
    /// Readings newly stored.
    pub inserted: usize,
    /// Valid readings already present in the store.
    pub duplicates: usize,
    /// Rows that could not be parsed or failed validation, with their line.
    pub rejected: Vec<String>,
}

impl Store {
    /// Import readings from CSV.
    ///
    /// Malformed rows are skipped and reported in [`ImportResult::rejected`].
    pub fn import_readings_csv<R: Read>(&self, reader: R) -> Result<ImportResult> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut result = ImportResult::default();
        let mut batch = Vec::with_capacity(IMPORT_BATCH);

        for row in csv.deserialize::<Reading>() {
            result.rows += 1;
            // Header is line 1
            let line = result.rows + 1;

            let reading = match row {
                Ok(reading) => reading,
                Err(e) => {
                    warn!("Skipping CSV line {}: {}", line, e);
                    result.rejected.push(format!("line {line}: {e}"));
                    continue;
                }
            };
            if let Err(e) = validate_reading(&reading) {
                warn!("Skipping CSV line {}: {}", line, e);
                result.rejected.push(format!("line {line}: {e}"));
                continue;
            }

            batch.push(reading);
            if batch.len() == IMPORT_BATCH {
                self.flush_import(&mut batch, &mut result)?;
            }
        }
        self.flush_import(&mut batch, &mut result)?;

        info!(
            "Imported {} readings from {} rows ({} duplicates, {} rejected)",
            result.inserted,
            result.rows,
            result.duplicates,
            result.rejected.len()
        );
        Ok(result)
    }

    fn flush_import(&self, batch: &mut Vec<Reading>, result: &mut ImportResult) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let inserted = self.insert_readings(batch)?;
        result.inserted += inserted;
        result.duplicates += batch.len() - inserted;
        batch.clear();
        Ok(())
    }

    /// Write the rollups matching `query` as CSV. Returns the record count.
    pub fn export_rollups_csv<W: Write>(&self, query: &RollupQuery, writer: W) -> Result<usize> {
        let records = self.query_rollups(query)?;
        let mut csv = csv::Writer::from_writer(writer);
        for record in &records {
            csv.serialize(record)?;
        }
        csv.flush()?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paddock_types::{AggregateRecord, Granularity, Quantity, Unit};
    use time::macros::datetime;

    #[test]
    fn test_import_readings() {
        let store = Store::open_in_memory().unwrap();
        let data = "\
sensor,quantity,timestamp,value,unit
S1,RainfallHourly,2024-03-01T02:00:00Z,2.0,mm/hr
S1,RainfallHourly,2024-03-01T14:00:00Z,1.5,mm
S1,AirTemperature,2024-03-01T14:00:00Z,70.1,°F
";
        let result = store.import_readings_csv(data.as_bytes()).unwrap();
        assert_eq!(result.rows, 3);
        assert_eq!(result.inserted, 3);
        assert!(result.rejected.is_empty());

        let readings = store
            .readings_in_range(
                "S1",
                Quantity::AirTemperature,
                datetime!(2024-03-01 00:00 UTC),
                datetime!(2024-03-02 00:00 UTC),
            )
            .unwrap();
        assert_eq!(readings[0].unit, Unit::Fahrenheit);
    }

    #[test]
    fn test_import_skips_bad_rows() {
        let store = Store::open_in_memory().unwrap();
        let data = "\
sensor,quantity,timestamp,value,unit
S1,RainfallHourly,2024-03-01T02:00:00Z,2.0,mm
S1,Co2,2024-03-01T03:00:00Z,400,ppm
S1,RainfallHourly,not-a-time,1.0,mm
S1,RainfallHourly,2024-03-01T02:00:00Z,2.0,mm
";
        let result = store.import_readings_csv(data.as_bytes()).unwrap();
        assert_eq!(result.rows, 4);
        assert_eq!(result.inserted, 1);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.rejected.len(), 2);
        assert!(result.rejected[0].starts_with("line 3"));
    }

    #[test]
    fn test_import_empty_unit_column() {
        let store = Store::open_in_memory().unwrap();
        let data = "sensor,quantity,timestamp,value,unit\nS1,UvIndex,2024-03-01T12:00:00Z,6,\n";
        let result = store.import_readings_csv(data.as_bytes()).unwrap();
        assert_eq!(result.inserted, 1);
    }

    #[test]
    fn test_export_rollups() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_rollup(&AggregateRecord {
                bucket_start: datetime!(2024-03-01 00:00 UTC),
                granularity: Granularity::Daily,
                sensor: "S1".to_string(),
                quantity: Quantity::RainfallHourly,
                value: 3.5,
                unit: Unit::Millimeter,
                sample_count: 2,
            })
            .unwrap();

        let mut out = Vec::new();
        let count = store.export_rollups_csv(&RollupQuery::new(), &mut out).unwrap();
        assert_eq!(count, 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("bucketStart,granularity,sensor,quantity,value,unit,sampleCount")
        );
        assert_eq!(
            lines.next(),
            Some("2024-03-01T00:00:00Z,DAILY,S1,RainfallHourly,3.5,mm,2")
        );
    }
}
