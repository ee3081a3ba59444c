use serde::Deserialize;
use std::str::FromStr;

// Configuration structure for column name mapping of the reach table
#[derive(Debug, Clone)]
pub struct ColumnConfig {
    pub table: String,
    pub key: String,
    pub downstream: String,
    pub order: String,
    pub length: String,
    pub width: String,
    pub depth: String,
    pub side_slope: String,
    pub velocity: String,
    pub slope: String,
    pub manning: String,
    pub k_bed: String,
    pub k_bank: String,
    pub cover: String,
    pub erod: String,
    pub bc: [String; 4],
    pub rk: [String; 4],
    pub rs: [String; 5],
    pub disox: String,
    pub bod: String,
    pub algae: String,
    pub orgn: String,
    pub nh4: String,
    pub no2: String,
    pub no3: String,
    pub orgp: String,
    pub solp: String,
}

impl ColumnConfig {
    pub fn new() -> Self {
        ColumnConfig {
            table: "reaches".to_string(),
            key: "SUBBASINID".to_string(),
            downstream: "DOWNSTREAM".to_string(),
            order: "UP_DOWN_ORDER".to_string(),
            length: "CH_LEN".to_string(),
            width: "CH_WIDTH".to_string(),
            depth: "CH_DEPTH".to_string(),
            side_slope: "CH_SSLP".to_string(),
            velocity: "CH_V0".to_string(),
            slope: "CH_SLP".to_string(),
            manning: "CH_N".to_string(),
            k_bed: "CH_K_BED".to_string(),
            k_bank: "CH_K_BANK".to_string(),
            cover: "CH_COVER".to_string(),
            erod: "CH_EROD".to_string(),
            bc: ["BC1", "BC2", "BC3", "BC4"].map(String::from),
            rk: ["RK1", "RK2", "RK3", "RK4"].map(String::from),
            rs: ["RS1", "RS2", "RS3", "RS4", "RS5"].map(String::from),
            disox: "DISOX".to_string(),
            bod: "BOD".to_string(),
            algae: "ALGAE".to_string(),
            orgn: "ORGN".to_string(),
            nh4: "NH4".to_string(),
            no2: "NO2".to_string(),
            no3: "NO3".to_string(),
            orgp: "ORGP".to_string(),
            solp: "SOLP".to_string(),
        }
    }

    /// Columns in the order `ReachParams::from_row` expects them.
    pub fn select_columns(&self) -> Vec<&str> {
        let mut cols = vec![
            self.key.as_str(),
            self.downstream.as_str(),
            self.order.as_str(),
            self.length.as_str(),
            self.width.as_str(),
            self.depth.as_str(),
            self.side_slope.as_str(),
            self.velocity.as_str(),
            self.slope.as_str(),
            self.manning.as_str(),
            self.k_bed.as_str(),
            self.k_bank.as_str(),
            self.cover.as_str(),
            self.erod.as_str(),
        ];
        cols.extend(self.bc.iter().map(String::as_str));
        cols.extend(self.rk.iter().map(String::as_str));
        cols.extend(self.rs.iter().map(String::as_str));
        cols.extend([
            self.disox.as_str(),
            self.bod.as_str(),
            self.algae.as_str(),
            self.orgn.as_str(),
            self.nh4.as_str(),
            self.no2.as_str(),
            self.no3.as_str(),
            self.orgp.as_str(),
            self.solp.as_str(),
        ]);
        cols
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self::new()
    }
}

// Output format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    NetCdf,
    Both,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "netcdf" | "nc" => Ok(OutputFormat::NetCdf),
            "both" => Ok(OutputFormat::Both),
            other => Err(format!("unknown output format `{other}`")),
        }
    }
}

/// How reaches are grouped into parallel layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayeringMethod {
    /// Kahn peeling: a reach joins the first layer after all its upstream reaches.
    #[default]
    Topological,
    /// One layer per stream order value. Rejected if it misorders the network.
    StreamOrder,
}

impl FromStr for LayeringMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "topological" | "kahn" => Ok(LayeringMethod::Topological),
            "stream-order" | "stream_order" | "order" => Ok(LayeringMethod::StreamOrder),
            other => Err(format!("unknown layering method `{other}`")),
        }
    }
}

// Reach parameters, one row of the reach table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReachParams {
    pub id: u32,
    pub downstream: u32,
    pub order: u32,
    /// m
    pub length: f64,
    /// bankfull width, m
    pub width: f64,
    /// bankfull depth, m
    pub depth: f64,
    #[serde(default = "default_side_slope")]
    pub side_slope: f64,
    /// m/s
    #[serde(default)]
    pub velocity: f64,
    #[serde(default)]
    pub slope: f64,
    #[serde(default)]
    pub manning: f64,
    /// mm/hr
    #[serde(default)]
    pub k_bed: f64,
    /// mm/hr
    #[serde(default)]
    pub k_bank: f64,
    #[serde(default)]
    pub cover: f64,
    #[serde(default)]
    pub erod: f64,
    #[serde(default)]
    pub bc1: f64,
    #[serde(default)]
    pub bc2: f64,
    #[serde(default)]
    pub bc3: f64,
    #[serde(default)]
    pub bc4: f64,
    #[serde(default)]
    pub rk1: f64,
    #[serde(default)]
    pub rk2: f64,
    #[serde(default)]
    pub rk3: f64,
    #[serde(default)]
    pub rk4: f64,
    #[serde(default)]
    pub rs1: f64,
    #[serde(default)]
    pub rs2: f64,
    #[serde(default)]
    pub rs3: f64,
    #[serde(default)]
    pub rs4: f64,
    #[serde(default)]
    pub rs5: f64,
    // initial concentrations, mg/L
    #[serde(default)]
    pub disox: f64,
    #[serde(default)]
    pub bod: f64,
    #[serde(default)]
    pub algae: f64,
    #[serde(default)]
    pub orgn: f64,
    #[serde(default)]
    pub nh4: f64,
    #[serde(default)]
    pub no2: f64,
    #[serde(default)]
    pub no3: f64,
    #[serde(default)]
    pub orgp: f64,
    #[serde(default)]
    pub solp: f64,
}

fn default_side_slope() -> f64 {
    2.0
}

impl ReachParams {
    /// Numeric parameter by table name, for calibration adjustments.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut f64> {
        let field = match name.to_ascii_lowercase().as_str() {
            "length" | "ch_len" => &mut self.length,
            "width" | "ch_width" => &mut self.width,
            "depth" | "ch_depth" => &mut self.depth,
            "side_slope" | "ch_sslp" => &mut self.side_slope,
            "velocity" | "ch_v0" => &mut self.velocity,
            "slope" | "ch_slp" => &mut self.slope,
            "manning" | "ch_n" => &mut self.manning,
            "k_bed" | "ch_k_bed" => &mut self.k_bed,
            "k_bank" | "ch_k_bank" => &mut self.k_bank,
            "cover" | "ch_cover" => &mut self.cover,
            "erod" | "ch_erod" => &mut self.erod,
            "bc1" => &mut self.bc1,
            "bc2" => &mut self.bc2,
            "bc3" => &mut self.bc3,
            "bc4" => &mut self.bc4,
            "rk1" => &mut self.rk1,
            "rk2" => &mut self.rk2,
            "rk3" => &mut self.rk3,
            "rk4" => &mut self.rk4,
            "rs1" => &mut self.rs1,
            "rs2" => &mut self.rs2,
            "rs3" => &mut self.rs3,
            "rs4" => &mut self.rs4,
            "rs5" => &mut self.rs5,
            "disox" => &mut self.disox,
            "bod" => &mut self.bod,
            "algae" => &mut self.algae,
            "orgn" => &mut self.orgn,
            "nh4" => &mut self.nh4,
            "no2" => &mut self.no2,
            "no3" => &mut self.no3,
            "orgp" => &mut self.orgp,
            "solp" => &mut self.solp,
            _ => return None,
        };
        Some(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_columns_matches_row_layout() {
        let binding = ColumnConfig::new();
        let cols = binding.select_columns();
        assert_eq!(cols.len(), 14 + 4 + 4 + 5 + 9);
        assert_eq!(cols[0], "SUBBASINID");
        assert_eq!(cols[14], "BC1");
        assert_eq!(cols[cols.len() - 1], "SOLP");
    }

    #[test]
    fn field_lookup_accepts_table_names() {
        let mut reach = ReachParams::default();
        *reach.field_mut("CH_K_BED").unwrap() = 3.5;
        *reach.field_mut("rk2").unwrap() = 1.2;
        assert_eq!(reach.k_bed, 3.5);
        assert_eq!(reach.rk2, 1.2);
        assert!(reach.field_mut("not_a_field").is_none());
    }

    #[test]
    fn parses_layering_and_output_format() {
        assert_eq!(
            "stream-order".parse::<LayeringMethod>().unwrap(),
            LayeringMethod::StreamOrder
        );
        assert_eq!("NC".parse::<OutputFormat>().unwrap(), OutputFormat::NetCdf);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
