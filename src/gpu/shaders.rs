//! WGSL sources for the simulation kernels
//!
//! Kernels are written against a generated preamble that declares the
//! parameter block, the shared queue state and one storage binding per node
//! attribute. Binding indices are derived from the attribute list, so the
//! preamble always agrees with the bind group layouts built on the host.

use std::fmt::Write;

use super::types::{ATTRIBUTE_COUNT, QUEUE_CAPACITY, SIDE_COUNT};
use crate::nodes::Attribute;

/// Entry point every simulation kernel must define
pub const KERNEL_ENTRY_POINT: &str = "simulate";

/// Built-in heat diffusion kernel
///
/// Heat (`data.x`) spreads between grid neighbors, nodes listed in the live
/// range of the shared queue act as heat sources, and warm nodes rise along y.
pub const DEFAULT_KERNEL: &str = r#"
struct UserUniforms {
// BEGIN_USER_UNIFS
    // comps 1 min 0 max 1 speed 0.01 def 0.25
    diffusion: vec4<f32>,
    // comps 1 min 0 max 10 speed 0.1 def 1
    heat_gen: vec4<f32>,
    // comps 1 min 0 max 1 speed 0.001 def 0.01
    growth: vec4<f32>,
    // comps 1 min 0 max 1 speed 0.01 def 0.1
    time_step: vec4<f32>,
// END_USER_UNIFS
}

fn is_source(node: u32, side: u32) -> bool {
    let len = params.queue_len;
    if (len == 0u) {
        return false;
    }
    var cursor = queue_state.start_ptrs[side] % len;
    let end = queue_state.end_ptrs[side] % len;
    loop {
        if (cursor == end) {
            break;
        }
        if (queue_state.queue_mem[cursor] == node) {
            return true;
        }
        cursor = (cursor + 1u) % len;
    }
    return false;
}

@compute @workgroup_size(256)
fn simulate(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.node_count) {
        return;
    }

    let side = params.iter_num % 2u;
    if (i == 0u) {
        atomicAdd(&queue_state.step_counters[side], 1u);
    }

    var neighbors = in_neighbors[i];
    out_neighbors[i] = neighbors;
    out_top_data[i] = in_top_data[i];

    if (i < params.inactive_node_count) {
        out_pos[i] = in_pos[i];
        out_vel[i] = in_vel[i];
        out_data[i] = in_data[i];
        return;
    }

    let unifs = params.user;
    var data = in_data[i];
    var heat_sum = 0.0;
    var count = 0.0;
    for (var slot = 0u; slot < 4u; slot += 1u) {
        let n = neighbors[slot];
        if (n >= 0.0) {
            heat_sum += in_data[u32(n)].x;
            count += 1.0;
        }
    }
    if (count > 0.0) {
        data.x = mix(data.x, heat_sum / count, unifs.diffusion.x);
    }
    if (is_source(i, side)) {
        data.x += unifs.heat_gen.x * unifs.time_step.x;
    }

    let vel = vec4<f32>(0.0, data.x * unifs.growth.x, 0.0, 0.0);
    out_vel[i] = vel;
    out_pos[i] = in_pos[i] + vel * unifs.time_step.x;
    out_data[i] = data;
}
"#;

/// Declarations shared by every simulation kernel
///
/// Group 0 holds the compute-binding-set: the written side's attributes as
/// `out_*`, the other side's as read-only `in_*`, then the queue state.
/// Group 1 holds the parameter block.
pub fn compute_preamble() -> String {
    let mut src = String::new();
    let _ = write!(
        src,
        r#"
struct QueueState {{
    step_counters: array<atomic<u32>, {SIDE_COUNT}>,
    start_ptrs: array<u32, {SIDE_COUNT}>,
    end_ptrs: array<u32, {SIDE_COUNT}>,
    _padding: array<u32, 2>,
    queue_mem: array<u32, {QUEUE_CAPACITY}>,
}}

struct ComputeParams {{
    node_count: u32,
    inactive_node_count: u32,
    iter_num: u32,
    queue_len: u32,
    user: UserUniforms,
}}

"#
    );

    for attr in Attribute::ALL {
        let _ = writeln!(
            src,
            "@group(0) @binding({}) var<storage, read_write> out_{}: array<vec4<f32>>;",
            attr.index(),
            attr.name()
        );
    }
    for attr in Attribute::ALL {
        let _ = writeln!(
            src,
            "@group(0) @binding({}) var<storage, read> in_{}: array<vec4<f32>>;",
            ATTRIBUTE_COUNT + attr.index(),
            attr.name()
        );
    }
    let _ = writeln!(
        src,
        "@group(0) @binding({}) var<storage, read_write> queue_state: QueueState;",
        2 * ATTRIBUTE_COUNT
    );
    let _ = writeln!(src, "@group(1) @binding(0) var<uniform> params: ComputeParams;");
    src
}

/// Declarations an external renderer can prepend to its shaders
///
/// Group 0 holds the render-binding-set, one read-only binding per attribute.
/// Group 1 holds the render parameter block; `RenderUniforms` is supplied by
/// the renderer's own source.
pub fn render_preamble() -> String {
    let mut src = String::from(
        r#"
struct RenderParams {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    user: RenderUniforms,
}

"#,
    );
    for attr in Attribute::ALL {
        let _ = writeln!(
            src,
            "@group(0) @binding({}) var<storage, read> {}: array<vec4<f32>>;",
            attr.index(),
            attr.name()
        );
    }
    let _ = writeln!(src, "@group(1) @binding(0) var<uniform> render_params: RenderParams;");
    src
}

/// Complete module source for a simulation kernel
pub fn kernel_module_source(kernel: &str) -> String {
    format!("{}\n{}", compute_preamble(), kernel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::parse_user_uniforms;

    #[test]
    fn test_preamble_binds_every_attribute_twice() {
        let src = compute_preamble();
        assert!(src.contains("@group(0) @binding(0) var<storage, read_write> out_pos"));
        assert!(src.contains("@group(0) @binding(4) var<storage, read_write> out_top_data"));
        assert!(src.contains("@group(0) @binding(5) var<storage, read> in_pos"));
        assert!(src.contains("@group(0) @binding(9) var<storage, read> in_top_data"));
        assert!(src.contains("@group(0) @binding(10) var<storage, read_write> queue_state"));
        assert!(src.contains("queue_mem: array<u32, 1000>"));
        assert_eq!(src.matches("@binding(").count(), 2 * ATTRIBUTE_COUNT + 2);
    }

    #[test]
    fn test_render_preamble_is_read_only() {
        let src = render_preamble();
        assert!(src.contains("@group(0) @binding(2) var<storage, read> neighbors"));
        assert!(!src.contains("read_write"));
    }

    #[test]
    fn test_default_kernel_declares_its_uniforms() {
        let uniforms = parse_user_uniforms(DEFAULT_KERNEL).unwrap();
        let names: Vec<_> = uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["diffusion", "heat_gen", "growth", "time_step"]);
        assert_eq!(uniforms[0].default_val, [0.25, 0.0, 0.0, 0.0]);
        assert!(uniforms.iter().all(|u| u.num_comps == 1));
    }

    #[test]
    fn test_kernel_module_defines_entry_point() {
        let src = kernel_module_source(DEFAULT_KERNEL);
        assert!(src.contains(&format!("fn {KERNEL_ENTRY_POINT}(")));
        assert!(src.find("struct QueueState") < src.find("struct UserUniforms"));
    }
}
