//! Rice variety catalog.
//!
//! The catalog is an ordered list of varieties plus an identifier index, so
//! "first in catalog order" is always well defined.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Aus,
    Aman,
    Boro,
}

impl Season {
    pub const ROTATION: [Season; 3] = [Season::Aus, Season::Aman, Season::Boro];

    pub fn next(self) -> Season {
        match self {
            Season::Aus => Season::Aman,
            Season::Aman => Season::Boro,
            Season::Boro => Season::Aus,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Season::Aus => "Aus (March-June, pre-monsoon)",
            Season::Aman => "Aman (July-November, monsoon)",
            Season::Boro => "Boro (December-May, dry season irrigated)",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Aus => "aus",
            Season::Aman => "aman",
            Season::Boro => "boro",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarietyId(pub String);

impl VarietyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VarietyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// Salinity (dS/m) the variety withstands without yield loss. `None`
    /// means the variety is not salt tolerant.
    #[serde(default)]
    pub salinity_ds_m: Option<f64>,
    #[serde(default)]
    pub drought: bool,
    #[serde(default)]
    pub flood: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variety {
    pub id: VarietyId,
    pub name: String,
    pub season: Season,
    #[serde(default)]
    pub high_yield: bool,
    pub potential_yield_t_ha: f64,
    #[serde(default = "default_maturity_days")]
    pub maturity_days: u32,
    #[serde(default)]
    pub tolerances: Tolerances,
    #[serde(default = "default_water_requirement")]
    pub water_requirement_mm: f64,
    #[serde(default = "default_input_cost")]
    pub input_cost_bdt_ha: f64,
}

fn default_maturity_days() -> u32 {
    120
}

fn default_water_requirement() -> f64 {
    1_200.0
}

fn default_input_cost() -> f64 {
    20_000.0
}

impl Variety {
    pub fn is_salt_tolerant(&self) -> bool {
        self.tolerances.salinity_ds_m.is_some()
    }

    pub fn salinity_tolerance(&self) -> Option<f64> {
        self.tolerances.salinity_ds_m
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("variety {0} defined more than once")]
    DuplicateVariety(VarietyId),
    #[error("variety {id} has invalid {field}")]
    InvalidField { id: VarietyId, field: &'static str },
    #[error("unknown variety {0}")]
    UnknownVariety(VarietyId),
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    varieties: Vec<Arc<Variety>>,
    index: HashMap<VarietyId, usize>,
}

impl Catalog {
    pub fn new(varieties: Vec<Variety>) -> Result<Self, CatalogError> {
        let mut catalog = Catalog::default();
        for variety in varieties {
            catalog.insert(variety)?;
        }
        Ok(catalog)
    }

    fn insert(&mut self, variety: Variety) -> Result<(), CatalogError> {
        if self.index.contains_key(&variety.id) {
            return Err(CatalogError::DuplicateVariety(variety.id));
        }
        let invalid = |field| CatalogError::InvalidField {
            id: variety.id.clone(),
            field,
        };
        if !(variety.potential_yield_t_ha.is_finite() && variety.potential_yield_t_ha >= 0.0) {
            return Err(invalid("potential_yield_t_ha"));
        }
        if !(variety.input_cost_bdt_ha.is_finite() && variety.input_cost_bdt_ha >= 0.0) {
            return Err(invalid("input_cost_bdt_ha"));
        }
        if variety.maturity_days == 0 {
            return Err(invalid("maturity_days"));
        }
        if let Some(threshold) = variety.tolerances.salinity_ds_m {
            if !(threshold.is_finite() && threshold >= 0.0) {
                return Err(invalid("tolerances.salinity_ds_m"));
            }
        }
        self.index.insert(variety.id.clone(), self.varieties.len());
        self.varieties.push(Arc::new(variety));
        Ok(())
    }

    /// Reference varieties for the coastal Bangladesh scenario.
    pub fn bangladesh_default() -> Self {
        let varieties = vec![
            Variety {
                id: VarietyId::new("brri_dhan28"),
                name: "BRRI dhan28".into(),
                season: Season::Boro,
                high_yield: true,
                potential_yield_t_ha: 6.0,
                maturity_days: 140,
                tolerances: Tolerances::default(),
                water_requirement_mm: default_water_requirement(),
                input_cost_bdt_ha: default_input_cost(),
            },
            Variety {
                id: VarietyId::new("brri_dhan29"),
                name: "BRRI dhan29".into(),
                season: Season::Boro,
                high_yield: true,
                potential_yield_t_ha: 7.0,
                maturity_days: 160,
                tolerances: Tolerances::default(),
                water_requirement_mm: default_water_requirement(),
                input_cost_bdt_ha: default_input_cost(),
            },
            Variety {
                id: VarietyId::new("brri_dhan47"),
                name: "BRRI dhan47".into(),
                season: Season::Boro,
                high_yield: true,
                potential_yield_t_ha: 5.5,
                maturity_days: 150,
                tolerances: Tolerances {
                    salinity_ds_m: Some(8.0),
                    ..Tolerances::default()
                },
                water_requirement_mm: default_water_requirement(),
                input_cost_bdt_ha: default_input_cost(),
            },
            Variety {
                id: VarietyId::new("swarna"),
                name: "Swarna (MTU7029)".into(),
                season: Season::Aman,
                high_yield: true,
                potential_yield_t_ha: 5.0,
                maturity_days: 145,
                tolerances: Tolerances::default(),
                water_requirement_mm: default_water_requirement(),
                input_cost_bdt_ha: default_input_cost(),
            },
            Variety {
                id: VarietyId::new("pajam"),
                name: "Pajam".into(),
                season: Season::Aman,
                high_yield: false,
                potential_yield_t_ha: 3.5,
                maturity_days: 150,
                tolerances: Tolerances::default(),
                water_requirement_mm: default_water_requirement(),
                input_cost_bdt_ha: default_input_cost(),
            },
        ];
        let mut catalog = Catalog::default();
        for variety in varieties {
            catalog
                .insert(variety)
                .expect("built-in catalog entries are valid and unique");
        }
        catalog
    }

    pub fn get(&self, id: &VarietyId) -> Option<&Arc<Variety>> {
        self.index.get(id).map(|&position| &self.varieties[position])
    }

    pub fn require(&self, id: &VarietyId) -> Result<&Arc<Variety>, CatalogError> {
        self.get(id)
            .ok_or_else(|| CatalogError::UnknownVariety(id.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Variety>> {
        self.varieties.iter()
    }

    pub fn for_season(&self, season: Season) -> impl Iterator<Item = &Arc<Variety>> {
        self.varieties.iter().filter(move |v| v.season == season)
    }

    pub fn len(&self) -> usize {
        self.varieties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.varieties.is_empty()
    }
}

/// Highest potential yield wins; equal yields resolve to the smaller id.
pub fn best_by_yield<'a, I>(candidates: I) -> Option<&'a Arc<Variety>>
where
    I: IntoIterator<Item = &'a Arc<Variety>>,
{
    candidates.into_iter().min_by(|a, b| {
        b.potential_yield_t_ha
            .total_cmp(&a.potential_yield_t_ha)
            .then_with(|| a.id.cmp(&b.id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variety(id: &str, season: Season, yield_t_ha: f64) -> Variety {
        Variety {
            id: VarietyId::new(id),
            name: id.to_string(),
            season,
            high_yield: true,
            potential_yield_t_ha: yield_t_ha,
            maturity_days: 120,
            tolerances: Tolerances::default(),
            water_requirement_mm: 1_200.0,
            input_cost_bdt_ha: 20_000.0,
        }
    }

    #[test]
    fn season_rotation_cycles() {
        assert_eq!(Season::Aus.next(), Season::Aman);
        assert_eq!(Season::Aman.next(), Season::Boro);
        assert_eq!(Season::Boro.next(), Season::Aus);
    }

    #[test]
    fn default_catalog_keeps_declaration_order() {
        let catalog = Catalog::bangladesh_default();
        let ids: Vec<_> = catalog.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(
            ids,
            ["brri_dhan28", "brri_dhan29", "brri_dhan47", "swarna", "pajam"]
        );
        assert_eq!(catalog.for_season(Season::Boro).count(), 3);
        assert_eq!(catalog.for_season(Season::Aus).count(), 0);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = Catalog::new(vec![
            variety("a", Season::Boro, 5.0),
            variety("a", Season::Aman, 4.0),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateVariety(VarietyId::new("a")));
    }

    #[test]
    fn zero_maturity_is_rejected() {
        let mut bad = variety("a", Season::Boro, 5.0);
        bad.maturity_days = 0;
        assert!(matches!(
            Catalog::new(vec![bad]),
            Err(CatalogError::InvalidField { field: "maturity_days", .. })
        ));
    }

    #[test]
    fn best_by_yield_breaks_ties_by_id() {
        let catalog = Catalog::new(vec![
            variety("zeta", Season::Boro, 6.0),
            variety("alpha", Season::Boro, 6.0),
            variety("low", Season::Boro, 3.0),
        ])
        .unwrap();
        let best = best_by_yield(catalog.iter()).unwrap();
        assert_eq!(best.id.as_str(), "alpha");
    }
}
