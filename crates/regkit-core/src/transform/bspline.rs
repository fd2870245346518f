//! B-Spline transform implementation.
//!
//! This module provides a cubic B-Spline free-form deformation transform.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::record::TransformKind;
use super::trait_::{ParametricTransform, Transform};
use crate::error::{GeometryError, Result};
use crate::image::image::physical_to_index_tensor;
use crate::image::ImageGeometry;
use crate::spatial::{direction_from_row_major, direction_to_row_major, Direction, Point, Spacing, Vector};

/// Order of the B-spline basis.
pub const SPLINE_ORDER: usize = 3;

/// Support of the cubic basis along one axis.
const SUPPORT: usize = SPLINE_ORDER + 1;

/// Slack (in control-grid units) when deciding whether a point lies inside
/// the transform domain.
const DOMAIN_TOLERANCE: f64 = 1e-4;

/// Number of mesh cells per axis for a control grid with roughly
/// `grid_physical_spacing` between nodes over `geometry`.
///
/// `cells = floor(size * spacing / grid_physical_spacing + 0.5)` clamped to
/// at least `minimum_grid_cells`; the mesh size is `cells - 1`.
pub fn bspline_mesh_size<const D: usize>(
    geometry: &ImageGeometry<D>,
    grid_physical_spacing: f64,
    minimum_grid_cells: usize,
) -> [usize; D] {
    let extent = geometry.physical_extent();
    std::array::from_fn(|axis| {
        let cells = (extent[axis] / grid_physical_spacing + 0.5).floor() as usize;
        cells.max(minimum_grid_cells).max(2) - 1
    })
}

/// B-Spline Transform (Free-form deformation).
///
/// Uses a grid of control points to define a smooth deformation field. The
/// control grid has `mesh_size + 3` nodes per axis and extends one node
/// beyond the domain on the low side, so the domain maps to continuous grid
/// indices `[1, mesh_size + 1]`.
///
/// Parameters hold every x displacement of the control grid (x-fastest node
/// order), then every y displacement, then every z displacement. Points
/// outside the domain are not displaced.
#[derive(Debug, Clone)]
pub struct BSplineTransform<B: Backend, const D: usize> {
    /// Control point displacements, `[D * num_control_points]`
    parameters: Tensor<B, 1>,
    /// Number of cells spanning the domain along each axis
    mesh_size: [usize; D],
    /// Physical location of control node (0, 0, ..)
    grid_origin: Point<D>,
    /// Spacing between control points
    grid_spacing: Spacing<D>,
    /// Orientation of the control grid
    grid_direction: Direction<D>,
}

impl<B: Backend, const D: usize> BSplineTransform<B, D> {
    /// Create a new B-Spline transform from its grid layout and parameters.
    pub fn new(
        mesh_size: [usize; D],
        grid_origin: Point<D>,
        grid_spacing: Spacing<D>,
        grid_direction: Direction<D>,
        parameters: Tensor<B, 1>,
    ) -> Result<Self> {
        for axis in 0..D {
            if mesh_size[axis] == 0 {
                return Err(GeometryError::degenerate_domain(format!("mesh has no cells along axis {}", axis)));
            }
            let value = grid_spacing[axis];
            if !(value.is_finite() && value > 0.0) {
                return Err(GeometryError::InvalidSpacing { axis, value });
            }
        }
        let expected = D * control_points(mesh_size);
        let actual = parameters.dims()[0];
        if actual != expected {
            return Err(GeometryError::ShapeMismatch {
                expected: vec![expected],
                actual: vec![actual],
            });
        }
        Ok(Self {
            parameters,
            mesh_size,
            grid_origin,
            grid_spacing,
            grid_direction,
        })
    }

    /// Identity deformation over the bounding box of `domain`'s voxel centres.
    ///
    /// Fails when the domain has zero physical length along an axis.
    pub fn over_domain(domain: &ImageGeometry<D>, mesh_size: [usize; D], device: &B::Device) -> Result<Self> {
        domain.validate()?;
        let size = domain.size();
        let spacing = domain.spacing();
        let mut grid_spacing = Spacing::<D>::zeros();
        for axis in 0..D {
            let length = (size[axis] as f64 - 1.0) * spacing[axis];
            if length <= 0.0 {
                return Err(GeometryError::degenerate_domain(format!(
                    "zero physical length along axis {}",
                    axis
                )));
            }
            if mesh_size[axis] == 0 {
                return Err(GeometryError::degenerate_domain(format!("mesh has no cells along axis {}", axis)));
            }
            grid_spacing[axis] = length / mesh_size[axis] as f64;
        }

        // One control node below the domain on every axis.
        let offset = (SPLINE_ORDER - 1) as f64 / 2.0;
        let shift = Vector::<D>::from_fn(|i, _| grid_spacing[i] * offset);
        let grid_origin = *domain.origin() - *domain.direction() * shift;

        let parameters = Tensor::<B, 1>::zeros([D * control_points(mesh_size)], device);
        Self::new(mesh_size, grid_origin, grid_spacing, *domain.direction(), parameters)
    }

    pub fn mesh_size(&self) -> [usize; D] {
        self.mesh_size
    }

    /// Number of control points along each axis.
    pub fn grid_size(&self) -> [usize; D] {
        std::array::from_fn(|axis| self.mesh_size[axis] + SPLINE_ORDER)
    }

    pub fn num_control_points(&self) -> usize {
        control_points(self.mesh_size)
    }

    pub fn grid_origin(&self) -> &Point<D> {
        &self.grid_origin
    }

    /// Get the control point spacing.
    pub fn grid_spacing(&self) -> &Spacing<D> {
        &self.grid_spacing
    }

    pub fn grid_direction(&self) -> &Direction<D> {
        &self.grid_direction
    }

    /// Control point displacements as `[num_control_points, D]`.
    pub fn coefficients(&self) -> Tensor<B, 2> {
        self.parameters
            .clone()
            .reshape([D, self.num_control_points()])
            .transpose()
    }

    /// Compute Cubic B-Spline basis functions.
    fn bspline_basis(u: Tensor<B, 1>) -> [Tensor<B, 1>; 4] {
        // u is in [0, 1)
        let one = 1.0;
        let two = 2.0;
        let three = 3.0;
        let four = 4.0;
        let six = 6.0;

        // B0 = (1-u)^3 / 6
        let one_minus_u = u.clone().neg().add_scalar(one);
        let b0 = one_minus_u.powf_scalar(three) / six;

        // B1 = (3u^3 - 6u^2 + 4) / 6
        let u2 = u.clone().powf_scalar(two);
        let u3 = u.clone().powf_scalar(three);
        let b1 = (u3.clone().mul_scalar(three) - u2.clone().mul_scalar(six)).add_scalar(four) / six;

        // B2 = (-3u^3 + 3u^2 + 3u + 1) / 6
        let b2 = (u3.clone().mul_scalar(-three) + u2.mul_scalar(three) + u.mul_scalar(three)).add_scalar(one) / six;

        // B3 = u^3 / 6
        let b3 = u3 / six;

        [b0, b1, b2, b3]
    }

    /// Compute Cubic B-Spline basis functions and stack them into a tensor [Batch, 4].
    fn compute_basis_tensor(u: Tensor<B, 1>) -> Tensor<B, 2> {
        let [b0, b1, b2, b3] = Self::bspline_basis(u);
        Tensor::cat(
            vec![
                b0.unsqueeze_dim::<2>(1),
                b1.unsqueeze_dim::<2>(1),
                b2.unsqueeze_dim::<2>(1),
                b3.unsqueeze_dim::<2>(1),
            ],
            1,
        )
    }

    /// Displacement `[Batch, D]` at physical points.
    pub fn displacement(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let batch_size = points.dims()[0];
        let grid_size = self.grid_size();
        let grid_index = physical_to_index_tensor(points, &self.grid_origin, &self.grid_spacing, &self.grid_direction);

        let lower_limit = (SPLINE_ORDER - 1) as f64 / 2.0;
        let offsets = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 3], &device).reshape([1, SUPPORT]);

        // Tensor-product weights and flat node indices, grown one axis at a
        // time: after axis a both are [Batch, 4^(a+1)].
        let mut inside = Tensor::<B, 1>::ones([batch_size], &device);
        let mut weights = Tensor::<B, 2>::ones([batch_size, 1], &device);
        let mut flat_index = Tensor::<B, 2, Int>::zeros([batch_size, 1], &device);
        let mut support = 1;
        let mut stride = 1i32;
        for axis in 0..D {
            let upper_limit = self.mesh_size[axis] as f64 + lower_limit;
            let coord = grid_index.clone().narrow(1, axis, 1).squeeze::<1>(1);
            inside = inside
                * coord.clone().greater_equal_elem(lower_limit - DOMAIN_TOLERANCE).float()
                * coord.clone().lower_equal_elem(upper_limit + DOMAIN_TOLERANCE).float();

            let coord = coord.clamp(lower_limit, upper_limit);
            let floor = coord.clone().floor();
            let basis = Self::compute_basis_tensor(coord - floor.clone()); // [Batch, 4]

            let start = floor.int().reshape([batch_size, 1]) - 1;
            let axis_index = (start + offsets.clone()).clamp(0, grid_size[axis] as i32 - 1) * stride; // [Batch, 4]

            weights = (weights.unsqueeze_dim::<3>(2) * basis.unsqueeze_dim::<3>(1))
                .reshape([batch_size, support * SUPPORT]);
            flat_index = (flat_index.unsqueeze_dim::<3>(2) + axis_index.unsqueeze_dim::<3>(1))
                .reshape([batch_size, support * SUPPORT]);

            support *= SUPPORT;
            stride *= grid_size[axis] as i32;
        }

        let coeffs = self
            .coefficients()
            .select(0, flat_index.reshape([batch_size * support]))
            .reshape([batch_size, support, D]);

        // Weighted sum over the support: [Batch, support, D] -> [Batch, D]
        let displacement = (coeffs * weights.reshape([batch_size, support, 1]))
            .sum_dim(1)
            .reshape([batch_size, D]);

        displacement * inside.reshape([batch_size, 1])
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for BSplineTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        points.clone() + self.displacement(points)
    }
}

impl<B: Backend, const D: usize> ParametricTransform<B, D> for BSplineTransform<B, D> {
    const KIND: TransformKind = TransformKind::BSpline;

    fn parameters(&self) -> Tensor<B, 1> {
        self.parameters.clone()
    }

    /// Mesh size, grid origin, grid spacing, then the grid direction in
    /// row-major order.
    fn fixed_parameters(&self) -> Vec<f64> {
        let mut fixed = Vec::with_capacity(3 * D + D * D);
        fixed.extend(self.mesh_size.iter().map(|&m| m as f64));
        fixed.extend(self.grid_origin.iter().copied());
        fixed.extend(self.grid_spacing.iter().copied());
        fixed.extend(direction_to_row_major(&self.grid_direction));
        fixed
    }

    fn with_parameters(&self, parameters: Tensor<B, 1>) -> Self {
        Self {
            parameters,
            mesh_size: self.mesh_size,
            grid_origin: self.grid_origin,
            grid_spacing: self.grid_spacing,
            grid_direction: self.grid_direction,
        }
    }

    fn from_parameters(parameters: Tensor<B, 1>, fixed_parameters: &[f64]) -> Result<Self> {
        if fixed_parameters.len() != 3 * D + D * D {
            return Err(GeometryError::record_mismatch(format!(
                "bspline transform needs {} fixed parameters, got {}",
                3 * D + D * D,
                fixed_parameters.len()
            )));
        }
        let mut mesh_size = [0usize; D];
        for (axis, &value) in fixed_parameters[..D].iter().enumerate() {
            if !(value.is_finite() && value >= 1.0 && value.fract() == 0.0) {
                return Err(GeometryError::record_mismatch(format!("invalid mesh size {} along axis {}", value, axis)));
            }
            mesh_size[axis] = value as usize;
        }
        let grid_origin = Point::from(Vector::<D>::from_fn(|i, _| fixed_parameters[D + i]));
        let grid_spacing = Spacing::<D>::from_fn(|i, _| fixed_parameters[2 * D + i]);
        let grid_direction = direction_from_row_major::<D>(&fixed_parameters[3 * D..]);

        Self::new(mesh_size, grid_origin, grid_spacing, grid_direction, parameters)
    }
}

fn control_points<const D: usize>(mesh_size: [usize; D]) -> usize {
    mesh_size.iter().map(|&m| m + SPLINE_ORDER).product()
}
