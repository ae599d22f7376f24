//! WGSL emission kernel.
//!
//! Two entry points share one module: `emit` samples the procedural shapes
//! and never touches the triangle buffer, `emit_mesh` samples the mesh
//! triangle list. Keeping the triangle access out of `emit` lets the
//! non-mesh pipeline use a layout without binding 12.

/// Placeholder replaced with the workgroup size.
const THREADS_PLACEHOLDER: &str = "{{THREADS_PER_GROUP}}";

/// Entry point for sphere, box, triangle and cone emitters.
pub const EMIT_ENTRY_POINT: &str = "emit";

/// Entry point for mesh emitters.
pub const EMIT_MESH_ENTRY_POINT: &str = "emit_mesh";

/// Emission kernel source with a workgroup-size placeholder.
const EMISSION_SHADER_TEMPLATE: &str = r"
const SHAPE_SPHERE: u32 = 0u;
const SHAPE_BOX: u32 = 1u;
const SHAPE_TRIANGLE: u32 = 2u;
const SHAPE_CONE: u32 = 3u;
const SHAPE_MESH: u32 = 4u;

const MODE_SURFACE: u32 = 0u;
const MODE_VOLUME: u32 = 1u;
const MODE_EDGE: u32 = 2u;

const TAU: f32 = 6.28318530718;

struct Common {
    shape: u32,
    seed: u32,
    time: f32,
    delta_time: f32,
}

struct SphereShape {
    translate: vec3<f32>,
    radius: f32,
    count: u32,
    emit: u32,
    pad0: u32,
    pad1: u32,
}

struct BoxShape {
    translate: vec3<f32>,
    count: u32,
    size: vec3<f32>,
    emit: u32,
}

struct TriangleShape {
    v1: vec3<f32>,
    count: u32,
    v2: vec3<f32>,
    emit: u32,
    v3: vec3<f32>,
    pad0: u32,
    translate: vec3<f32>,
    pad1: u32,
}

struct ConeShape {
    translate: vec3<f32>,
    radius: f32,
    direction: vec3<f32>,
    height: f32,
    count: u32,
    emit: u32,
    pad0: u32,
    pad1: u32,
}

struct MeshShape {
    translate: vec3<f32>,
    count: u32,
    scale: vec3<f32>,
    emit: u32,
    rotation: vec4<f32>,
    mode: u32,
    triangle_count: u32,
    pad0: u32,
    pad1: u32,
}

struct Frame {
    time: f32,
    delta_time: f32,
    frame_index: u32,
    pool_capacity: u32,
}

struct Spawn {
    lifetime: f32,
    lifetime_variance: f32,
    rotation: f32,
    rotation_variance: f32,
    rotation_speed: f32,
    rotation_speed_variance: f32,
    billboard: u32,
    pad0: u32,
    scale: vec3<f32>,
    pad1: f32,
    scale_variance: vec3<f32>,
    pad2: f32,
    velocity: vec3<f32>,
    pad3: f32,
    velocity_variance: vec3<f32>,
    pad4: f32,
    color: vec4<f32>,
    color_variance: vec4<f32>,
}

struct MeshTriangle {
    v0: vec3<f32>,
    area: f32,
    v1: vec3<f32>,
    edge_mask: u32,
    v2: vec3<f32>,
    cumulative_area: f32,
    normal: vec3<f32>,
    pad0: u32,
}

struct Particle {
    position: vec3<f32>,
    lifetime: f32,
    velocity: vec3<f32>,
    age: f32,
    scale: vec3<f32>,
    rotation: f32,
    color: vec4<f32>,
    rotation_speed: f32,
    billboard: u32,
    alive: u32,
    pad0: u32,
}

@group(0) @binding(0) var<uniform> u_common: Common;
@group(0) @binding(1) var<uniform> u_sphere: SphereShape;
@group(0) @binding(2) var<uniform> u_box: BoxShape;
@group(0) @binding(3) var<uniform> u_triangle: TriangleShape;
@group(0) @binding(4) var<uniform> u_cone: ConeShape;
@group(0) @binding(5) var<uniform> u_mesh: MeshShape;
@group(0) @binding(6) var<uniform> u_frame: Frame;
@group(0) @binding(7) var<uniform> u_spawn: Spawn;
@group(0) @binding(8) var<storage, read_write> particles: array<Particle>;
@group(0) @binding(9) var<storage, read_write> free_list_index: atomic<i32>;
@group(0) @binding(10) var<storage, read> free_list: array<u32>;
@group(0) @binding(11) var<storage, read_write> active_count: atomic<u32>;
@group(0) @binding(12) var<storage, read> triangles: array<MeshTriangle>;

var<private> rng_state: u32;

fn pcg_hash(input: u32) -> u32 {
    let state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn seed_rng(thread: u32) {
    rng_state = pcg_hash(thread ^ pcg_hash(u_common.seed ^ pcg_hash(u_frame.frame_index)));
}

fn rand() -> f32 {
    rng_state = pcg_hash(rng_state);
    return f32(rng_state) / 4294967295.0;
}

fn rand_signed() -> f32 {
    return rand() * 2.0 - 1.0;
}

fn rand_signed3() -> vec3<f32> {
    return vec3<f32>(rand_signed(), rand_signed(), rand_signed());
}

fn rand_unit_vector() -> vec3<f32> {
    let z = rand_signed();
    let angle = rand() * TAU;
    let r = sqrt(max(1.0 - z * z, 0.0));
    return vec3<f32>(r * cos(angle), r * sin(angle), z);
}

fn rotate_by_quat(q: vec4<f32>, v: vec3<f32>) -> vec3<f32> {
    let t = 2.0 * cross(q.xyz, v);
    return v + q.w * t + cross(q.xyz, t);
}

fn barycentric_point(a: vec3<f32>, b: vec3<f32>, c: vec3<f32>) -> vec3<f32> {
    var u = rand();
    var v = rand();
    if (u + v > 1.0) {
        u = 1.0 - u;
        v = 1.0 - v;
    }
    return a + (b - a) * u + (c - a) * v;
}

// Returns (count, emit) for the active shape.
fn active_request() -> vec2<u32> {
    var request = vec2<u32>(0u, 0u);
    switch u_common.shape {
        case 0u: { request = vec2<u32>(u_sphere.count, u_sphere.emit); }
        case 1u: { request = vec2<u32>(u_box.count, u_box.emit); }
        case 2u: { request = vec2<u32>(u_triangle.count, u_triangle.emit); }
        case 3u: { request = vec2<u32>(u_cone.count, u_cone.emit); }
        case 4u: { request = vec2<u32>(u_mesh.count, u_mesh.emit); }
        default: {}
    }
    return request;
}

// Pops one slot from the shared free list, or returns -1 when it is empty.
fn allocate_slot() -> i32 {
    let top = atomicSub(&free_list_index, 1);
    if (top < 0) {
        atomicAdd(&free_list_index, 1);
        return -1;
    }
    return i32(free_list[u32(top)]);
}

fn spawn_particle(position: vec3<f32>) {
    let slot = allocate_slot();
    if (slot < 0 || u32(slot) >= u_frame.pool_capacity) {
        return;
    }

    var p: Particle;
    p.position = position;
    p.lifetime = max(u_spawn.lifetime + rand_signed() * u_spawn.lifetime_variance, 0.001);
    p.velocity = u_spawn.velocity + rand_signed3() * u_spawn.velocity_variance;
    p.age = 0.0;
    p.scale = max(u_spawn.scale + rand_signed3() * u_spawn.scale_variance, vec3<f32>(0.0));
    p.rotation = u_spawn.rotation + rand_signed() * u_spawn.rotation_variance;
    p.color = clamp(
        u_spawn.color + vec4<f32>(rand_signed(), rand_signed(), rand_signed(), rand_signed()) * u_spawn.color_variance,
        vec4<f32>(0.0),
        vec4<f32>(1.0),
    );
    p.rotation_speed = u_spawn.rotation_speed + rand_signed() * u_spawn.rotation_speed_variance;
    p.billboard = u_spawn.billboard;
    p.alive = 1u;
    p.pad0 = 0u;

    particles[u32(slot)] = p;
    atomicAdd(&active_count, 1u);
}

fn sample_sphere() -> vec3<f32> {
    let r = u_sphere.radius * pow(rand(), 1.0 / 3.0);
    return u_sphere.translate + rand_unit_vector() * r;
}

fn sample_box() -> vec3<f32> {
    let local = vec3<f32>(rand(), rand(), rand()) - vec3<f32>(0.5);
    return u_box.translate + local * u_box.size;
}

fn sample_triangle() -> vec3<f32> {
    return u_triangle.translate + barycentric_point(u_triangle.v1, u_triangle.v2, u_triangle.v3);
}

fn sample_cone() -> vec3<f32> {
    var axis = vec3<f32>(0.0, 1.0, 0.0);
    if (length(u_cone.direction) > 1e-6) {
        axis = normalize(u_cone.direction);
    }
    var helper = vec3<f32>(1.0, 0.0, 0.0);
    if (abs(axis.x) > 0.9) {
        helper = vec3<f32>(0.0, 0.0, 1.0);
    }
    let tangent = normalize(cross(axis, helper));
    let bitangent = cross(axis, tangent);

    let h = rand() * u_cone.height;
    let ring = u_cone.radius * (h / max(u_cone.height, 1e-6)) * sqrt(rand());
    let angle = rand() * TAU;
    return u_cone.translate + axis * h + (tangent * cos(angle) + bitangent * sin(angle)) * ring;
}

// Area-weighted triangle selection over the cumulative area column.
fn pick_triangle(count: u32) -> u32 {
    let total = triangles[count - 1u].cumulative_area;
    if (total <= 0.0) {
        return min(u32(rand() * f32(count)), count - 1u);
    }
    let target_area = rand() * total;
    var lo = 0u;
    var hi = count - 1u;
    loop {
        if (lo >= hi) {
            break;
        }
        let mid = (lo + hi) / 2u;
        if (triangles[mid].cumulative_area < target_area) {
            lo = mid + 1u;
        } else {
            hi = mid;
        }
    }
    return lo;
}

fn edge_point(tri: MeshTriangle, edge: u32) -> vec3<f32> {
    let t = rand();
    if (edge == 0u) {
        return mix(tri.v0, tri.v1, t);
    }
    if (edge == 1u) {
        return mix(tri.v1, tri.v2, t);
    }
    return mix(tri.v2, tri.v0, t);
}

// Picks a random boundary edge of `tri`; -1 when every edge is internal.
fn pick_boundary_edge(tri: MeshTriangle) -> i32 {
    let mask = tri.edge_mask & 7u;
    let boundary = countOneBits(mask);
    if (boundary == 0u) {
        return -1;
    }
    var nth = min(u32(rand() * f32(boundary)), boundary - 1u);
    for (var edge = 0u; edge < 3u; edge = edge + 1u) {
        if ((mask & (1u << edge)) != 0u) {
            if (nth == 0u) {
                return i32(edge);
            }
            nth = nth - 1u;
        }
    }
    return -1;
}

fn sample_mesh_local() -> vec3<f32> {
    let count = u_mesh.triangle_count;
    var tri = triangles[pick_triangle(count)];

    if (u_mesh.mode == MODE_EDGE) {
        for (var attempt = 0u; attempt < 8u; attempt = attempt + 1u) {
            let edge = pick_boundary_edge(tri);
            if (edge >= 0) {
                return edge_point(tri, u32(edge));
            }
            tri = triangles[pick_triangle(count)];
        }
        return barycentric_point(tri.v0, tri.v1, tri.v2);
    }

    let surface = barycentric_point(tri.v0, tri.v1, tri.v2);
    if (u_mesh.mode == MODE_VOLUME) {
        return surface * pow(rand(), 1.0 / 3.0);
    }
    return surface;
}

@compute @workgroup_size({{THREADS_PER_GROUP}})
fn emit(@builtin(global_invocation_id) id: vec3<u32>) {
    let request = active_request();
    if (u_common.shape == SHAPE_MESH || request.y == 0u || id.x >= request.x) {
        return;
    }
    seed_rng(id.x);

    var position = vec3<f32>(0.0);
    switch u_common.shape {
        case 0u: { position = sample_sphere(); }
        case 1u: { position = sample_box(); }
        case 2u: { position = sample_triangle(); }
        case 3u: { position = sample_cone(); }
        default: { return; }
    }
    spawn_particle(position);
}

@compute @workgroup_size({{THREADS_PER_GROUP}})
fn emit_mesh(@builtin(global_invocation_id) id: vec3<u32>) {
    if (u_common.shape != SHAPE_MESH || u_mesh.emit == 0u || id.x >= u_mesh.count) {
        return;
    }
    if (u_mesh.triangle_count == 0u) {
        return;
    }
    seed_rng(id.x);

    let local = sample_mesh_local() * u_mesh.scale;
    spawn_particle(u_mesh.translate + rotate_by_quat(u_mesh.rotation, local));
}
";

/// Returns the emission kernel source for the given workgroup size.
#[must_use]
pub fn emission_shader_source(threads_per_group: u32) -> String {
    EMISSION_SHADER_TEMPLATE.replace(THREADS_PLACEHOLDER, &threads_per_group.max(1).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::THREADS_PER_GROUP;
    use crate::dispatch::BindingSlot;

    #[test]
    fn test_workgroup_size_substituted() {
        let source = emission_shader_source(THREADS_PER_GROUP);
        assert!(source.contains("@workgroup_size(1024)"));
        assert!(!source.contains(THREADS_PLACEHOLDER));
    }

    #[test]
    fn test_entry_points_present() {
        let source = emission_shader_source(256);
        assert!(source.contains(&format!("fn {EMIT_ENTRY_POINT}(")));
        assert!(source.contains(&format!("fn {EMIT_MESH_ENTRY_POINT}(")));
    }

    #[test]
    fn test_bindings_declared_in_protocol_order() {
        let source = emission_shader_source(THREADS_PER_GROUP);
        let mut last_position = 0;
        for slot in BindingSlot::dispatch_order(true) {
            let decl = format!("@binding({})", slot.index());
            let position = source.find(&decl).expect("binding declared");
            assert!(position >= last_position);
            last_position = position;
        }
    }
}
