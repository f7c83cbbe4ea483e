use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::OptimizerError;

/// Traffic data as accepted at the ingress boundary. Two shapes are
/// supported: parallel `location_pairs` + `factors` lists (must be the
/// same length), or a `segments` map keyed `"from_id-to_id"`. Internally
/// everything is translated to `(from_idx, to_idx) -> factor`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_pairs: Option<Vec<(String, String)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factors: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<BTreeMap<String, f64>>,
}

impl TrafficData {
    /// Translates the accepted shapes into index-keyed factors for the
    /// matrix builder. Unknown location ids are skipped with a warning;
    /// mismatched pair/factor lengths are an input error.
    pub fn to_index_factors(
        &self,
        location_ids: &[String],
    ) -> Result<HashMap<(usize, usize), f64>, OptimizerError> {
        let index_of: HashMap<&str, usize> = location_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();

        let mut factors = HashMap::new();

        if let Some(pairs) = &self.location_pairs {
            let values = self.factors.as_deref().unwrap_or(&[]);
            if pairs.len() != values.len() {
                return Err(OptimizerError::InvalidInput(format!(
                    "traffic data has {} location pairs but {} factors",
                    pairs.len(),
                    values.len()
                )));
            }
            for ((from_id, to_id), factor) in pairs.iter().zip(values) {
                match (index_of.get(from_id.as_str()), index_of.get(to_id.as_str())) {
                    (Some(&from_idx), Some(&to_idx)) => {
                        factors.insert((from_idx, to_idx), *factor);
                    }
                    _ => warn!(
                        "Skipping traffic factor for unknown location pair ({}, {})",
                        from_id, to_id
                    ),
                }
            }
        }

        if let Some(segments) = &self.segments {
            for (key, factor) in segments {
                let Some((from_id, to_id)) = key.split_once('-') else {
                    warn!("Skipping malformed traffic segment key {:?}", key);
                    continue;
                };
                match (index_of.get(from_id), index_of.get(to_id)) {
                    (Some(&from_idx), Some(&to_idx)) => {
                        factors.insert((from_idx, to_idx), *factor);
                    }
                    _ => warn!(
                        "Skipping traffic segment for unknown location pair ({}, {})",
                        from_id, to_id
                    ),
                }
            }
        }

        Ok(factors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<String> {
        vec!["depot".to_string(), "c1".to_string(), "c2".to_string()]
    }

    #[test]
    fn translates_pair_list() {
        let data = TrafficData {
            location_pairs: Some(vec![
                ("depot".into(), "c1".into()),
                ("c1".into(), "c2".into()),
            ]),
            factors: Some(vec![1.5, 2.0]),
            segments: None,
        };
        let factors = data.to_index_factors(&ids()).unwrap();
        assert_eq!(factors[&(0, 1)], 1.5);
        assert_eq!(factors[&(1, 2)], 2.0);
    }

    #[test]
    fn translates_segment_map() {
        let data = TrafficData {
            location_pairs: None,
            factors: None,
            segments: Some(BTreeMap::from([("depot-c2".to_string(), 3.0)])),
        };
        let factors = data.to_index_factors(&ids()).unwrap();
        assert_eq!(factors, HashMap::from([((0, 2), 3.0)]));
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let data = TrafficData {
            location_pairs: Some(vec![("depot".into(), "c1".into())]),
            factors: Some(vec![]),
            segments: None,
        };
        assert!(data.to_index_factors(&ids()).is_err());
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let data = TrafficData {
            location_pairs: Some(vec![("depot".into(), "nowhere".into())]),
            factors: Some(vec![2.0]),
            segments: None,
        };
        let factors = data.to_index_factors(&ids()).unwrap();
        assert!(factors.is_empty());
    }
}
