use super::lattice::Lattice;
use nalgebra::Point3;
use std::collections::BTreeMap;
use thiserror::Error;

/// A single occupied position in the cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub kind: String,
    /// Fractional coordinates with respect to the owning structure's lattice.
    pub position: Point3<f64>,
}

impl Site {
    pub fn new(kind: impl Into<String>, position: Point3<f64>) -> Self {
        Self {
            kind: kind.into(),
            position,
        }
    }
}

/// Raised when a new site would sit closer to an existing one than allowed.
#[derive(Debug, Error, Clone, PartialEq)]
#[error(
    "{kind} at ({:.4}, {:.4}, {:.4}) is {distance:.3} Å from {neighbor_kind} #{neighbor_index} (minimum {minimum:.3} Å)",
    .position.x,
    .position.y,
    .position.z
)]
pub struct ProximityError {
    pub kind: String,
    pub position: Point3<f64>,
    pub neighbor_kind: String,
    pub neighbor_index: usize,
    pub distance: f64,
    pub minimum: f64,
}

/// A periodic crystal structure: a fixed lattice plus an ordered list of sites.
///
/// Structures are treated as values. Adding a site produces a new `Structure`
/// and leaves the original untouched, which lets the refinement loop hold on to
/// the previous cycle's structure while the next one is being built.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    lattice: Lattice,
    sites: Vec<Site>,
}

impl Structure {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Self {
        Self { lattice, sites }
    }

    pub fn empty(lattice: Lattice) -> Self {
        Self::new(lattice, Vec::new())
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.sites.iter().filter(|s| s.kind == kind).count()
    }

    pub fn positions_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Point3<f64>> + 'a {
        self.sites
            .iter()
            .filter(move |s| s.kind == kind)
            .map(|s| &s.position)
    }

    /// Number of sites per kind, ordered by kind label.
    pub fn composition(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for site in &self.sites {
            *counts.entry(site.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct kinds in order of first appearance.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = Vec::new();
        for site in &self.sites {
            if !kinds.contains(&site.kind.as_str()) {
                kinds.push(&site.kind);
            }
        }
        kinds
    }

    /// Index and minimum-image distance of the site closest to `position`,
    /// optionally restricted to one kind.
    pub fn nearest_site(&self, position: &Point3<f64>, kind: Option<&str>) -> Option<(usize, f64)> {
        self.sites
            .iter()
            .enumerate()
            .filter(|(_, s)| kind.is_none_or(|k| s.kind == k))
            .map(|(i, s)| (i, self.lattice.periodic_distance(&s.position, position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Returns a copy of this structure with one more site appended.
    ///
    /// # Errors
    ///
    /// Returns [`ProximityError`] if any existing site lies closer than
    /// `min_separation` Å (minimum-image convention).
    pub fn with_site(
        &self,
        kind: &str,
        position: Point3<f64>,
        min_separation: f64,
    ) -> Result<Self, ProximityError> {
        if let Some((index, distance)) = self.nearest_site(&position, None) {
            if distance < min_separation {
                return Err(ProximityError {
                    kind: kind.to_string(),
                    position,
                    neighbor_kind: self.sites[index].kind.clone(),
                    neighbor_index: index,
                    distance,
                    minimum: min_separation,
                });
            }
        }

        let mut sites = self.sites.clone();
        sites.push(Site::new(kind, position));
        Ok(Self {
            lattice: self.lattice.clone(),
            sites,
        })
    }

    /// Per-site relaxation mask: sites of the tracked kind move, all others are
    /// held fixed (`true` means frozen).
    pub fn freeze_mask(&self, tracked_kind: &str) -> Vec<bool> {
        self.sites.iter().map(|s| s.kind != tracked_kind).collect()
    }
}
