use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Ion species the solver knows how to track.
///
/// `P` is the lumped intracellular protein (immobile), `M` a lumped mobile anion that
/// also stands in for bicarbonate when H+ is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IonName {
    Na,
    K,
    Cl,
    Ca,
    H,
    P,
    M,
}

impl IonName {
    pub const ALL: [IonName; 7] = [
        IonName::Na,
        IonName::K,
        IonName::Cl,
        IonName::Ca,
        IonName::H,
        IonName::P,
        IonName::M,
    ];

    /// Valence of the species.
    pub fn valence(self) -> f64 {
        match self {
            IonName::Na | IonName::K | IonName::H => 1.0,
            IonName::Ca => 2.0,
            IonName::Cl | IonName::P | IonName::M => -1.0,
        }
    }

    /// Free diffusion constant in water (m^2/s).
    pub fn free_diffusion(self) -> f64 {
        match self {
            IonName::Na => 1.33e-9,
            IonName::K => 1.96e-9,
            IonName::Cl => 2.03e-9,
            IonName::Ca => 0.79e-9,
            IonName::H => 2.5e-9,
            IonName::P => 5.0e-12,
            IonName::M => 1.0e-9,
        }
    }

    /// Default cytosolic concentration (mol/m^3). `M` is recomputed for charge balance.
    pub fn default_cell_conc(self) -> f64 {
        match self {
            IonName::Na => 8.66,
            IonName::K => 125.0,
            IonName::Cl => 5.0,
            IonName::Ca => 1.0e-4,
            IonName::H => 3.98e-8,
            IonName::P => 80.0,
            IonName::M => 0.0,
        }
    }

    /// Default environmental concentration (mol/m^3). `M` is recomputed for charge balance.
    pub fn default_env_conc(self) -> f64 {
        match self {
            IonName::Na => 145.0,
            IonName::K => 5.0,
            IonName::Cl => 105.0,
            IonName::Ca => 1.0,
            IonName::H => 3.98e-8,
            IonName::P => 10.0,
            IonName::M => 0.0,
        }
    }

    /// Default membrane diffusion constant (m^2/s).
    pub fn default_mem_perm(self) -> f64 {
        match self {
            IonName::Na => 1.0e-18,
            IonName::K => 15.0e-18,
            IonName::Cl => 2.0e-18,
            IonName::Ca => 1.0e-18,
            IonName::H => 1.0e-18,
            IonName::P => 0.0,
            IonName::M => 0.5e-18,
        }
    }

    /// Immobile species are excluded from membrane and junction electrodiffusion.
    pub fn is_mobile(self) -> bool {
        self != IonName::P
    }
}

impl fmt::Display for IonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IonName::Na => "Na",
            IonName::K => "K",
            IonName::Cl => "Cl",
            IonName::Ca => "Ca",
            IonName::H => "H",
            IonName::P => "P",
            IonName::M => "M",
        };
        f.write_str(s)
    }
}

/// Fixed slot assignment from ion name to row of the concentration arrays,
/// resolved once when the parameters are built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IonTable {
    names: Vec<IonName>,
    slots: HashMap<IonName, usize>,
}

impl IonTable {
    pub fn new(names: &[IonName]) -> Self {
        let mut table = IonTable::default();
        for &name in names {
            if !table.slots.contains_key(&name) {
                table.slots.insert(name, table.names.len());
                table.names.push(name);
            }
        }
        table
    }

    /// Slot of `name`, or `None` if the ion is not tracked.
    pub fn index(&self, name: IonName) -> Option<usize> {
        self.slots.get(&name).copied()
    }

    pub fn contains(&self, name: IonName) -> bool {
        self.slots.contains_key(&name)
    }

    pub fn names(&self) -> &[IonName] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Slots of all species that take part in electrodiffusion, in table order.
    pub fn mobile_slots(&self) -> Vec<usize> {
        self.names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_mobile())
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_assigns_slots_in_order_and_skips_duplicates() {
        let table = IonTable::new(&[IonName::Na, IonName::K, IonName::Na, IonName::M]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.index(IonName::Na), Some(0));
        assert_eq!(table.index(IonName::K), Some(1));
        assert_eq!(table.index(IonName::M), Some(2));
        assert_eq!(table.index(IonName::Ca), None);
    }

    #[test]
    fn protein_is_not_mobile() {
        let table = IonTable::new(&[IonName::Na, IonName::P, IonName::K]);
        assert_eq!(table.mobile_slots(), vec![0, 2]);
    }
}
