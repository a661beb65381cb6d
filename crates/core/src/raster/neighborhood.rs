//! Neighborhood shapes for moving-window operations

/// Defines a neighborhood pattern around a cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Neighborhood {
    /// Square window of side `2 * radius + 1`
    Square(usize),
    /// Ellipse with radii given in cells along columns (`rx`) and rows (`ry`).
    ///
    /// Circular kernels on non-square ground pixels (geographic grids) become
    /// ellipses in pixel space.
    Ellipse { rx: f64, ry: f64 },
}

impl Neighborhood {
    /// Circle of the given radius in cells
    pub fn circle(radius: f64) -> Self {
        Neighborhood::Ellipse {
            rx: radius,
            ry: radius,
        }
    }

    /// Half-extent of the bounding box as (rows, cols)
    pub fn extent(&self) -> (usize, usize) {
        match *self {
            Neighborhood::Square(r) => (r, r),
            Neighborhood::Ellipse { rx, ry } => (ry.max(0.0).floor() as usize, rx.max(0.0).floor() as usize),
        }
    }

    /// Check if a relative position is within this neighborhood
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        match *self {
            Neighborhood::Square(r) => {
                let r = r as isize;
                dr.abs() <= r && dc.abs() <= r
            }
            Neighborhood::Ellipse { rx, ry } => {
                if dr == 0 && dc == 0 {
                    return true;
                }
                if rx <= 0.0 || ry <= 0.0 {
                    return false;
                }
                let x = dc as f64 / rx;
                let y = dr as f64 / ry;
                x * x + y * y <= 1.0 + 1e-12
            }
        }
    }

    /// Relative (row, col) positions in this neighborhood, center included
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let (er, ec) = self.extent();
        let (er, ec) = (er as isize, ec as isize);
        let mut offsets = Vec::new();

        for dr in -er..=er {
            for dc in -ec..=ec {
                if self.contains(dr, dc) {
                    offsets.push((dr, dc));
                }
            }
        }

        offsets
    }
}
