//! Vector index configuration
//!
//! Closed set of index providers, all with cosine distance. Parameters
//! follow the store defaults: IVF `nlist = 128`, HNSW `M = 16,
//! ef_construction = 200`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, VellumError};
use crate::store::schema::VECTOR_FIELD;

pub const DEFAULT_NLIST: u32 = 128;
pub const DEFAULT_HNSW_M: u32 = 16;
pub const DEFAULT_HNSW_EF_CONSTRUCTION: u32 = 200;

/// Index provider for the `text_embedding` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexKind {
    IvfFlat { nlist: u32 },
    Hnsw { m: u32, ef_construction: u32 },
    IvfSq8 { nlist: u32 },
    Flat,
}

impl Default for IndexKind {
    fn default() -> Self {
        IndexKind::IvfFlat {
            nlist: DEFAULT_NLIST,
        }
    }
}

impl IndexKind {
    /// Index type identifier on the wire
    pub fn index_type(&self) -> &'static str {
        match self {
            IndexKind::IvfFlat { .. } => "IVF_FLAT",
            IndexKind::Hnsw { .. } => "HNSW",
            IndexKind::IvfSq8 { .. } => "IVF_SQ8",
            IndexKind::Flat => "FLAT",
        }
    }

    /// Index parameters in the shape the store expects
    pub fn build_params(&self) -> serde_json::Value {
        let params = match self {
            IndexKind::IvfFlat { nlist } | IndexKind::IvfSq8 { nlist } => {
                json!({ "nlist": nlist })
            }
            IndexKind::Hnsw { m, ef_construction } => {
                json!({ "M": m, "efConstruction": ef_construction })
            }
            IndexKind::Flat => json!({}),
        };
        json!({
            "index_type": self.index_type(),
            "metric_type": "COSINE",
            "params": params,
        })
    }

    /// Field the index applies to
    pub fn field_name(&self) -> &'static str {
        VECTOR_FIELD
    }
}

impl std::str::FromStr for IndexKind {
    type Err = VellumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "default" | "ivf_flat" => Ok(IndexKind::IvfFlat {
                nlist: DEFAULT_NLIST,
            }),
            "hnsw" => Ok(IndexKind::Hnsw {
                m: DEFAULT_HNSW_M,
                ef_construction: DEFAULT_HNSW_EF_CONSTRUCTION,
            }),
            "ivf_sq8" => Ok(IndexKind::IvfSq8 {
                nlist: DEFAULT_NLIST,
            }),
            "flat" => Ok(IndexKind::Flat),
            _ => Err(VellumError::Config(format!(
                "Unknown index '{}'. Supported indices: default, ivf_flat, hnsw, ivf_sq8, flat",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry() {
        assert_eq!(
            "default".parse::<IndexKind>().unwrap(),
            IndexKind::IvfFlat { nlist: 128 }
        );
        assert_eq!(
            "ivf_flat".parse::<IndexKind>().unwrap(),
            IndexKind::IvfFlat { nlist: 128 }
        );
        assert_eq!(
            "HNSW".parse::<IndexKind>().unwrap(),
            IndexKind::Hnsw {
                m: 16,
                ef_construction: 200
            }
        );
        assert_eq!("flat".parse::<IndexKind>().unwrap(), IndexKind::Flat);
        assert!("lsh".parse::<IndexKind>().is_err());
    }

    #[test]
    fn test_params_are_cosine() {
        for kind in [
            IndexKind::default(),
            IndexKind::Hnsw {
                m: 16,
                ef_construction: 200,
            },
            IndexKind::IvfSq8 { nlist: 128 },
            IndexKind::Flat,
        ] {
            let params = kind.build_params();
            assert_eq!(params["metric_type"], "COSINE");
            assert_eq!(kind.field_name(), "text_embedding");
        }
    }

    #[test]
    fn test_hnsw_params() {
        let params = IndexKind::Hnsw {
            m: 16,
            ef_construction: 200,
        }
        .build_params();
        assert_eq!(params["index_type"], "HNSW");
        assert_eq!(params["params"]["M"], 16);
        assert_eq!(params["params"]["efConstruction"], 200);
    }
}
