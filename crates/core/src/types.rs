//! Table shape and bin addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate of one spatial-time bin: (r, theta, t).
pub type Bin3 = [usize; 3];

/// Coordinate of one table cell: (r, theta, t, theta_dir, phi_dir).
pub type Bin5 = [usize; 5];

/// Bin counts of a 5-D photon table.
///
/// The first three axes (r, theta, t) locate a spatial-time bin; the last
/// two (theta_dir, phi_dir) span that bin's angular photon-direction map.
/// All linear addressing is row-major, so the angular map of a spatial bin
/// is a contiguous run of `angular_cells()` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableShape {
    pub r_bins: usize,
    pub theta_bins: usize,
    pub t_bins: usize,
    pub theta_dir_bins: usize,
    pub phi_dir_bins: usize,
}

impl TableShape {
    pub fn new(
        r_bins: usize,
        theta_bins: usize,
        t_bins: usize,
        theta_dir_bins: usize,
        phi_dir_bins: usize,
    ) -> Self {
        Self {
            r_bins,
            theta_bins,
            t_bins,
            theta_dir_bins,
            phi_dir_bins,
        }
    }

    /// Number of spatial-time bins (r * theta * t).
    #[inline]
    pub fn spatial_bins(&self) -> usize {
        self.r_bins * self.theta_bins * self.t_bins
    }

    /// Number of cells in one angular map (theta_dir * phi_dir).
    #[inline]
    pub fn angular_cells(&self) -> usize {
        self.theta_dir_bins * self.phi_dir_bins
    }

    /// Total number of cells in the 5-D table.
    #[inline]
    pub fn total_cells(&self) -> usize {
        self.spatial_bins() * self.angular_cells()
    }

    /// Row-major linear index of a spatial-time bin.
    #[inline]
    pub fn spatial_index(&self, bin: Bin3) -> usize {
        debug_assert!(bin[0] < self.r_bins && bin[1] < self.theta_bins && bin[2] < self.t_bins);
        (bin[0] * self.theta_bins + bin[1]) * self.t_bins + bin[2]
    }

    /// Inverse of [`spatial_index`](Self::spatial_index).
    #[inline]
    pub fn spatial_coord(&self, index: usize) -> Bin3 {
        debug_assert!(index < self.spatial_bins());
        let t = index % self.t_bins;
        let rest = index / self.t_bins;
        [rest / self.theta_bins, rest % self.theta_bins, t]
    }

    /// Row-major linear index of a single 5-D cell.
    #[inline]
    pub fn cell_index(&self, bin: Bin5) -> usize {
        let spatial = self.spatial_index([bin[0], bin[1], bin[2]]);
        debug_assert!(bin[3] < self.theta_dir_bins && bin[4] < self.phi_dir_bins);
        spatial * self.angular_cells() + bin[3] * self.phi_dir_bins + bin[4]
    }

    /// Offset of a spatial bin's angular map within the flat count buffer.
    #[inline]
    pub fn angular_offset(&self, bin: Bin3) -> usize {
        self.spatial_index(bin) * self.angular_cells()
    }

    /// The (r, theta, t) bin counts.
    pub fn spatial_dims(&self) -> [usize; 3] {
        [self.r_bins, self.theta_bins, self.t_bins]
    }

    /// The (theta_dir, phi_dir) bin counts.
    pub fn angular_dims(&self) -> [usize; 2] {
        [self.theta_dir_bins, self.phi_dir_bins]
    }
}

impl fmt::Display for TableShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.r_bins, self.theta_bins, self.t_bins, self.theta_dir_bins, self.phi_dir_bins
        )
    }
}
