use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Vector3};
use vulkanalia::prelude::v1_0::*;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const fn new(pos: [f32; 2], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            pos,
            color,
            tex_coord,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        let pos = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(offset_of!(Vertex, pos) as u32)
            .build();
        let color = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(1)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(offset_of!(Vertex, color) as u32)
            .build();
        let tex_coord = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(2)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(offset_of!(Vertex, tex_coord) as u32)
            .build();
        [pos, color, tex_coord]
    }
}

pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0], [1.0, 1.0]),
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Per-image transform block read by the vertex shader at binding 0.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// Spins the quad about +Z at 90 degrees per second.
    pub fn at(elapsed_seconds: f32, extent: vk::Extent2D) -> Self {
        let model = Matrix4::new_rotation(Vector3::z() * elapsed_seconds * 90f32.to_radians());

        let view = Matrix4::look_at_rh(
            &Point3::new(2.0, 2.0, 2.0),
            &Point3::origin(),
            &Vector3::z(),
        );

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Matrix4::new_perspective(aspect, 45f32.to_radians(), 0.1, 10.0);
        // Vulkan clip space has Y pointing down.
        proj[(1, 1)] *= -1.0;

        Self {
            model: model.into(),
            view: view.into(),
            proj: proj.into(),
        }
    }

    pub fn size() -> vk::DeviceSize {
        size_of::<Self>() as vk::DeviceSize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn quad_is_two_triangles_over_four_vertices() {
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES
            .iter()
            .all(|&i| (i as usize) < QUAD_VERTICES.len()));

        let first = &QUAD_INDICES[..3];
        let second = &QUAD_INDICES[3..];
        assert_eq!(first[2], second[0]);
        assert_eq!(first[0], second[2]);
    }

    #[test]
    fn attribute_layout_matches_vertex_struct() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 28);

        let attributes = Vertex::attribute_descriptions();
        let offsets = attributes.iter().map(|a| a.offset).collect::<Vec<_>>();
        let locations = attributes.iter().map(|a| a.location).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 8, 20]);
        assert_eq!(locations, vec![0, 1, 2]);
    }

    #[test]
    fn model_starts_at_identity() {
        let ubo = UniformBufferObject::at(0.0, EXTENT);
        let model = Matrix4::from(ubo.model);

        assert_relative_eq!(model, Matrix4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn model_turns_a_quarter_per_second() {
        let ubo = UniformBufferObject::at(1.0, EXTENT);
        let model = Matrix4::from(ubo.model);

        let x_axis = model * Vector4::new(1.0, 0.0, 0.0, 0.0);
        assert_relative_eq!(x_axis, Vector4::new(0.0, 1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn projection_flips_y_and_tracks_aspect() {
        let wide = UniformBufferObject::at(0.0, EXTENT);
        let square = UniformBufferObject::at(0.0, vk::Extent2D { width: 600, height: 600 });

        // Column-major: proj[1][1] is the Y scale.
        assert!(wide.proj[1][1] < 0.0);
        assert_relative_eq!(wide.proj[0][0] * 800.0 / 600.0, wide.proj[1][1].abs(), epsilon = 1e-5);
        assert_relative_eq!(square.proj[0][0], square.proj[1][1].abs(), epsilon = 1e-5);
    }

    #[test]
    fn block_is_three_packed_matrices() {
        assert_eq!(UniformBufferObject::size(), 3 * 64);
    }
}
