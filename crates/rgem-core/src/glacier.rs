//! Glacier inventory attributes.
//!
//! Glaciers are identified by their Randolph Glacier Inventory (RGI) id, e.g.
//! `RGI60-15.03473`: the text before the `.` holds the inventory version and first-order
//! region, the text after it is the glacier number within that region.

use crate::errors::{GemError, GemResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Attributes of a single glacier from the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlacierAttributes {
    pub rgi_id: String,
    pub o1_region: u32,
    pub o2_region: u32,
    /// Glacier number within the first-order region, e.g. `03473`
    pub glacier_number: String,
    pub cen_lat: f64,
    pub cen_lon: f64,
    /// Inventory area (km^2)
    pub area_km2: f64,
    /// Minimum elevation (m a.s.l.)
    pub zmin: f64,
    /// Median elevation (m a.s.l.)
    pub zmed: f64,
    /// Maximum elevation (m a.s.l.)
    pub zmax: f64,
    pub slope: f64,
    pub aspect: f64,
    /// 0 land-terminating, 1 marine-terminating, 2 lake-terminating
    pub term_type: i32,
    /// Ice volume from the hypsometry (km^3), zero until computed
    pub volume_km3: f64,
    /// Area-weighted mean elevation from the hypsometry (m a.s.l.), zero until computed
    pub zmean: f64,
}

impl GlacierAttributes {
    /// True if the glacier terminates in water.
    pub fn is_water_terminating(&self) -> bool {
        self.term_type != 0
    }
}

/// Parse the glacier number from an RGI id.
pub fn glacier_number(rgi_id: &str) -> GemResult<String> {
    match rgi_id.rsplit_once('.') {
        Some((_, number)) if !number.is_empty() => Ok(number.to_string()),
        _ => Err(GemError::InvalidInput(format!(
            "malformed RGI id '{}'",
            rgi_id
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct RgiRecord {
    #[serde(rename = "RGIId")]
    rgi_id: String,
    #[serde(rename = "CenLat")]
    cen_lat: f64,
    #[serde(rename = "CenLon")]
    cen_lon: f64,
    #[serde(rename = "O1Region")]
    o1_region: u32,
    #[serde(rename = "O2Region")]
    o2_region: u32,
    #[serde(rename = "Area")]
    area: f64,
    #[serde(rename = "Zmin")]
    zmin: f64,
    #[serde(rename = "Zmed")]
    zmed: f64,
    #[serde(rename = "Zmax")]
    zmax: f64,
    #[serde(rename = "Slope", default)]
    slope: f64,
    #[serde(rename = "Aspect", default)]
    aspect: f64,
    #[serde(rename = "TermType", default)]
    term_type: i32,
}

impl TryFrom<RgiRecord> for GlacierAttributes {
    type Error = GemError;

    fn try_from(record: RgiRecord) -> GemResult<Self> {
        Ok(Self {
            glacier_number: glacier_number(&record.rgi_id)?,
            rgi_id: record.rgi_id,
            o1_region: record.o1_region,
            o2_region: record.o2_region,
            cen_lat: record.cen_lat,
            cen_lon: record.cen_lon,
            area_km2: record.area,
            zmin: record.zmin,
            zmed: record.zmed,
            zmax: record.zmax,
            slope: record.slope,
            aspect: record.aspect,
            term_type: record.term_type,
            volume_km3: 0.0,
            zmean: 0.0,
        })
    }
}

/// Read every glacier from a single inventory table.
pub fn read_rgi_table<P: AsRef<Path>>(path: P) -> GemResult<Vec<GlacierAttributes>> {
    let path = path.as_ref();
    let csv_err = |source| GemError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize::<RgiRecord>()
        .map(|record| GlacierAttributes::try_from(record.map_err(csv_err)?))
        .collect()
}

fn csv_files_in(dir: &Path) -> GemResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|source| GemError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map(|e| e == "csv").unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}

/// Select glaciers from the inventory tables in `rgi_dir`.
///
/// # Arguments
///
/// * `rgi_dir` - Directory of inventory `.csv` tables
/// * `regions_o1` - First-order regions to keep
/// * `regions_o2` - Second-order regions to keep (`None` keeps all)
/// * `glacier_numbers` - Glacier numbers to keep (`None` keeps all)
///
/// # Returns
///
/// The selected glaciers sorted by RGI id, or an error if nothing matched.
pub fn select_glaciers(
    rgi_dir: &Path,
    regions_o1: &[u32],
    regions_o2: Option<&[u32]>,
    glacier_numbers: Option<&[String]>,
) -> GemResult<Vec<GlacierAttributes>> {
    let mut selected = Vec::new();

    for file in csv_files_in(rgi_dir)? {
        let glaciers = read_rgi_table(&file)?;
        debug!("Read {} glaciers from {}", glaciers.len(), file.display());

        selected.extend(glaciers.into_iter().filter(|g| {
            regions_o1.contains(&g.o1_region)
                && regions_o2.map_or(true, |r| r.contains(&g.o2_region))
                && glacier_numbers.map_or(true, |n| n.contains(&g.glacier_number))
        }));
    }

    if selected.is_empty() {
        return Err(GemError::InvalidInput(format!(
            "no glaciers in {} match regions {:?}",
            rgi_dir.display(),
            regions_o1
        )));
    }

    selected.sort_by(|a, b| a.rgi_id.cmp(&b.rgi_id));
    selected.dedup_by(|a, b| a.rgi_id == b.rgi_id);
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "RGIId,CenLat,CenLon,O1Region,O2Region,Area,Zmin,Zmed,Zmax,Slope,Aspect,TermType
RGI60-15.00002,28.1,86.5,15,2,3.5,5100,5600,6200,20,180,0
RGI60-15.00001,28.0,86.4,15,1,12.0,4900,5400,6500,15,90,0
RGI60-15.00003,28.2,86.6,15,1,0.8,5300,5500,5700,25,0,2
";

    fn write_table(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rgem-rgi-{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = std::fs::File::create(dir.join("15_rgi60.csv")).unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        dir
    }

    #[test]
    fn parse_glacier_number() {
        assert_eq!(glacier_number("RGI60-15.03473").unwrap(), "03473");
        assert!(glacier_number("RGI60-15").is_err());
        assert!(glacier_number("RGI60-15.").is_err());
    }

    #[test]
    fn select_all_in_region() {
        let dir = write_table("all");
        let glaciers = select_glaciers(&dir, &[15], None, None).unwrap();

        assert_eq!(glaciers.len(), 3);
        // Sorted by id
        assert_eq!(glaciers[0].rgi_id, "RGI60-15.00001");
        assert_eq!(glaciers[0].glacier_number, "00001");
        assert_eq!(glaciers[2].term_type, 2);
        assert!(glaciers[2].is_water_terminating());
    }

    #[test]
    fn select_by_subregion_and_number() {
        let dir = write_table("subset");

        let glaciers = select_glaciers(&dir, &[15], Some(&[1]), None).unwrap();
        assert_eq!(glaciers.len(), 2);

        let numbers = vec!["00002".to_string()];
        let glaciers = select_glaciers(&dir, &[15], None, Some(&numbers)).unwrap();
        assert_eq!(glaciers.len(), 1);
        assert_eq!(glaciers[0].zmed, 5600.0);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let dir = write_table("empty");
        assert!(select_glaciers(&dir, &[13], None, None).is_err());
    }
}
