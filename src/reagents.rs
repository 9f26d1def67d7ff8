//! Reagent catalog shared by the chemistry engine and the Safety Checker.

use serde::{Deserialize, Serialize};

use crate::variables::normalize_name;

/// Hazard/reactivity class of a reagent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReagentClass {
    /// Fully dissociating acid such as HCl.
    StrongAcid,
    /// Acid such as vinegar.
    WeakAcid,
    /// Fully dissociating base such as NaOH.
    StrongBase,
    /// Base such as ammonia.
    WeakBase,
    /// Hypochlorite.
    Bleach,
    /// Oxidizing peroxide.
    Peroxide,
    /// Flammable organic material.
    Organic,
    /// Water, salts and unknown reagents.
    Neutral,
}

impl ReagentClass {
    /// Strong or weak acid.
    #[must_use]
    pub const fn is_acid(&self) -> bool {
        matches!(self, Self::StrongAcid | Self::WeakAcid)
    }

    /// Strong or weak base.
    #[must_use]
    pub const fn is_base(&self) -> bool {
        matches!(self, Self::StrongBase | Self::WeakBase)
    }
}

/// Catalog entry for a known reagent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReagentInfo {
    /// Reactivity class.
    pub class: ReagentClass,
    /// Protons donated (acids) or accepted (bases) per mole.
    pub equivalents: f64,
    /// Whether this reagent is ammonia, which reacts with bleach.
    pub is_ammonia: bool,
}

impl ReagentInfo {
    const fn new(class: ReagentClass, equivalents: f64) -> Self {
        Self {
            class,
            equivalents,
            is_ammonia: false,
        }
    }
}

const CATALOG: &[(&[&str], ReagentInfo)] = &[
    (&["hcl", "hydrochloric acid"], ReagentInfo::new(ReagentClass::StrongAcid, 1.0)),
    (&["hno3", "nitric acid"], ReagentInfo::new(ReagentClass::StrongAcid, 1.0)),
    (&["h2so4", "sulfuric acid", "sulphuric acid"], ReagentInfo::new(ReagentClass::StrongAcid, 2.0)),
    (&["ch3cooh", "acetic acid", "vinegar"], ReagentInfo::new(ReagentClass::WeakAcid, 1.0)),
    (&["citric acid"], ReagentInfo::new(ReagentClass::WeakAcid, 3.0)),
    (&["naoh", "sodium hydroxide"], ReagentInfo::new(ReagentClass::StrongBase, 1.0)),
    (&["koh", "potassium hydroxide"], ReagentInfo::new(ReagentClass::StrongBase, 1.0)),
    (&["ca(oh)2", "calcium hydroxide", "limewater"], ReagentInfo::new(ReagentClass::StrongBase, 2.0)),
    (&["nahco3", "sodium bicarbonate", "baking soda"], ReagentInfo::new(ReagentClass::WeakBase, 1.0)),
    (
        &["nh3", "ammonia", "ammonium hydroxide"],
        ReagentInfo {
            class: ReagentClass::WeakBase,
            equivalents: 1.0,
            is_ammonia: true,
        },
    ),
    (&["bleach", "naocl", "sodium hypochlorite"], ReagentInfo::new(ReagentClass::Bleach, 0.0)),
    (&["h2o2", "hydrogen peroxide", "peroxide"], ReagentInfo::new(ReagentClass::Peroxide, 0.0)),
    (
        &["ethanol", "methanol", "acetone", "glucose", "sugar", "oil", "glycerol"],
        ReagentInfo::new(ReagentClass::Organic, 0.0),
    ),
];

const NEUTRAL: ReagentInfo = ReagentInfo::new(ReagentClass::Neutral, 0.0);

/// Looks up a reagent by name. Unknown reagents are neutral.
#[must_use]
pub fn lookup(name: &str) -> ReagentInfo {
    let name = normalize_name(name);
    CATALOG
        .iter()
        .find(|(names, _)| names.contains(&name.as_str()))
        .map_or(NEUTRAL, |(_, info)| *info)
}

/// Class of a reagent by name.
#[must_use]
pub fn classify(name: &str) -> ReagentClass {
    lookup(name).class
}
