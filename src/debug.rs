use crate::settings::CloudSettings;
use cgmath::Vector3;

pub const GIZMO_GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

/// Anything that can draw world-space debug lines.
pub trait GizmoSink {
    fn draw_line(&mut self, from: Vector3<f32>, to: Vector3<f32>, color: [f32; 4]);

    /// Twelve edges of an axis-aligned box.
    fn draw_wire_cube(&mut self, center: Vector3<f32>, size: Vector3<f32>, color: [f32; 4]) {
        let h = size * 0.5;
        let corner = |sx: f32, sy: f32, sz: f32| {
            Vector3::new(center.x + sx * h.x, center.y + sy * h.y, center.z + sz * h.z)
        };

        for &(sy, sz) in &[(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            self.draw_line(corner(-1.0, sy, sz), corner(1.0, sy, sz), color);
        }
        for &(sx, sz) in &[(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            self.draw_line(corner(sx, -1.0, sz), corner(sx, 1.0, sz), color);
        }
        for &(sx, sy) in &[(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            self.draw_line(corner(sx, sy, -1.0), corner(sx, sy, 1.0), color);
        }
    }
}

/// Outline the cloud volume in green. Nothing is drawn for disabled settings.
pub fn draw_bounds(settings: &CloudSettings, sink: &mut dyn GizmoSink) {
    if !settings.enabled() {
        return;
    }
    sink.draw_wire_cube(settings.center(), settings.size(), GIZMO_GREEN);
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl LineVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Line list collected over a frame, ready for upload.
#[derive(Debug, Default, Clone)]
pub struct DebugLines {
    vertices: Vec<LineVertex>,
}

impl DebugLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[LineVertex] {
        &self.vertices
    }

    pub fn line_count(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }
}

impl GizmoSink for DebugLines {
    fn draw_line(&mut self, from: Vector3<f32>, to: Vector3<f32>, color: [f32; 4]) {
        self.vertices.push(LineVertex {
            position: from.into(),
            color,
        });
        self.vertices.push(LineVertex {
            position: to.into(),
            color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_gizmo_has_twelve_green_edges() {
        let mut settings = CloudSettings::default();
        settings.set_center(Vector3::new(0.0, 10.0, 0.0));
        settings.set_size(Vector3::new(4.0, 2.0, 6.0));

        let mut lines = DebugLines::new();
        draw_bounds(&settings, &mut lines);

        assert_eq!(lines.line_count(), 12);
        assert!(lines.vertices().iter().all(|v| v.color == GIZMO_GREEN));

        let (min, max) = settings.bounds();
        for v in lines.vertices() {
            for axis in 0..3 {
                let p = v.position[axis];
                assert!(p == min[axis] || p == max[axis]);
            }
        }
    }

    #[test]
    fn every_edge_runs_along_one_axis() {
        let mut lines = DebugLines::new();
        lines.draw_wire_cube(Vector3::new(1.0, 2.0, 3.0), Vector3::new(2.0, 2.0, 2.0), GIZMO_GREEN);
        for pair in lines.vertices().chunks(2) {
            let differing = (0..3)
                .filter(|&i| pair[0].position[i] != pair[1].position[i])
                .count();
            assert_eq!(differing, 1);
        }
    }

    #[test]
    fn disabled_settings_draw_nothing() {
        let mut settings = CloudSettings::default();
        settings.set_enabled(false);
        let mut lines = DebugLines::new();
        draw_bounds(&settings, &mut lines);
        assert_eq!(lines.line_count(), 0);
    }
}
