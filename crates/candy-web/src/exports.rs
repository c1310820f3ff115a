//! Export surface of the accelerated particle module.
//!
//! Pointers are byte offsets into this instance's linear memory. Every batch
//! export checks that its arrays lie inside blocks handed out by `allocate`
//! and do not overlap before touching them. Batch exports return `0`
//! without touching memory when that check fails and `1` otherwise. Every
//! argument and result is a plain number so the raw instance exports can be
//! called directly, without the generated JS glue.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::RefCell;

use candy_core::particles::kernels;
use candy_core::LiveBlocks;
use glam::Vec3;
use wasm_bindgen::prelude::*;

const ALIGN: usize = 16;

thread_local! {
    static LIVE: RefCell<LiveBlocks> = RefCell::new(LiveBlocks::default());
}

// Batch status. Plain integers survive a call through the raw instance
// exports, where a `bool` would arrive as a number.
const OK: u32 = 1;
const REJECTED: u32 = 0;

#[wasm_bindgen]
pub fn allocate(bytes: u32) -> u32 {
    if bytes == 0 {
        return 0;
    }
    let Ok(layout) = Layout::from_size_align(bytes as usize, ALIGN) else {
        return 0;
    };
    // SAFETY: layout has a non-zero size.
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        log::warn!("[exports] allocation of {} bytes failed", bytes);
        return 0;
    }
    let addr = ptr as u32;
    LIVE.with(|live| live.borrow_mut().insert(addr, bytes));
    addr
}

#[wasm_bindgen]
pub fn deallocate(ptr: u32) {
    let Some(bytes) = LIVE.with(|live| live.borrow_mut().remove(ptr)) else {
        return;
    };
    if let Ok(layout) = Layout::from_size_align(bytes as usize, ALIGN) {
        // SAFETY: `ptr` came from `allocate` with this exact layout and was live.
        unsafe { dealloc(ptr as *mut u8, layout) }
    }
}

/// Check `(ptr, floats_per_item)` arrays of `count` items for one call.
fn validate(name: &str, count: u32, arrays: &[(u32, usize)]) -> bool {
    let ok = LIVE.with(|live| live.borrow().check_arrays(count, arrays));
    if !ok {
        log::warn!("[exports] {name}: arrays outside allocated memory or overlapping");
    }
    ok
}

/// # Safety
/// `ptr` must have passed [`validate`] for `len` floats, with no other live
/// reference to the same range.
unsafe fn view_mut<'a>(ptr: u32, len: usize) -> &'a mut [f32] {
    std::slice::from_raw_parts_mut(ptr as *mut f32, len)
}

/// # Safety
/// As [`view_mut`], shared.
unsafe fn view<'a>(ptr: u32, len: usize) -> &'a [f32] {
    std::slice::from_raw_parts(ptr as *const f32, len)
}

#[wasm_bindgen(js_name = updateRainBatch)]
#[allow(clippy::too_many_arguments)]
pub fn update_rain_batch(
    positions_ptr: u32,
    velocities_ptr: u32,
    offsets_ptr: u32,
    count: u32,
    time: f32,
    bass: f32,
    rain_intensity: f32,
) -> u32 {
    if !validate(
        "updateRainBatch",
        count,
        &[(positions_ptr, 3), (velocities_ptr, 1), (offsets_ptr, 1)],
    ) {
        return REJECTED;
    }
    let n = count as usize;
    // SAFETY: validated and disjoint.
    let (positions, velocities, offsets) = unsafe {
        (
            view_mut(positions_ptr, n * 3),
            view(velocities_ptr, n),
            view(offsets_ptr, n),
        )
    };
    kernels::update_rain_batch(positions, velocities, offsets, time, bass, rain_intensity);
    OK
}

#[wasm_bindgen(js_name = updateMistBatch)]
pub fn update_mist_batch(
    positions_ptr: u32,
    drifts_ptr: u32,
    offsets_ptr: u32,
    count: u32,
    time: f32,
    melody: f32,
) -> u32 {
    if !validate(
        "updateMistBatch",
        count,
        &[(positions_ptr, 3), (drifts_ptr, 1), (offsets_ptr, 1)],
    ) {
        return REJECTED;
    }
    let n = count as usize;
    // SAFETY: validated and disjoint.
    let (positions, drifts, offsets) = unsafe {
        (
            view_mut(positions_ptr, n * 3),
            view(drifts_ptr, n),
            view(offsets_ptr, n),
        )
    };
    kernels::update_mist_batch(positions, drifts, offsets, time, melody);
    OK
}

#[wasm_bindgen(js_name = updateParticlesWasm)]
#[allow(clippy::too_many_arguments)]
pub fn update_particles(
    positions_ptr: u32,
    velocities_ptr: u32,
    count: u32,
    dt: f32,
    gravity: f32,
    pulse: f32,
    spawn_x: f32,
    spawn_y: f32,
    spawn_z: f32,
    global_time: f32,
) -> u32 {
    if !validate("updateParticlesWasm", count, &[(positions_ptr, 4), (velocities_ptr, 4)]) {
        return REJECTED;
    }
    let n = count as usize;
    // SAFETY: validated and disjoint.
    let (positions, velocities) =
        unsafe { (view_mut(positions_ptr, n * 4), view_mut(velocities_ptr, n * 4)) };
    kernels::update_compute_batch(
        positions,
        velocities,
        dt,
        gravity,
        pulse,
        Vec3::new(spawn_x, spawn_y, spawn_z),
        global_time,
    );
    OK
}

#[wasm_bindgen(js_name = batchDistanceCull)]
#[allow(clippy::too_many_arguments)]
pub fn batch_distance_cull(
    positions_ptr: u32,
    flags_ptr: u32,
    count: u32,
    ref_x: f32,
    ref_y: f32,
    ref_z: f32,
    max_dist_sq: f32,
) -> u32 {
    if !validate("batchDistanceCull", count, &[(positions_ptr, 3), (flags_ptr, 1)]) {
        return 0;
    }
    let n = count as usize;
    // SAFETY: validated and disjoint.
    let (positions, flags) = unsafe { (view(positions_ptr, n * 3), view_mut(flags_ptr, n)) };
    kernels::distance_cull(positions, flags, Vec3::new(ref_x, ref_y, ref_z), max_dist_sq) as u32
}

#[wasm_bindgen(js_name = batchDistances)]
pub fn batch_distances(
    positions_ptr: u32,
    results_ptr: u32,
    count: u32,
    ref_x: f32,
    ref_y: f32,
    ref_z: f32,
) -> u32 {
    if !validate("batchDistances", count, &[(positions_ptr, 3), (results_ptr, 1)]) {
        return REJECTED;
    }
    let n = count as usize;
    // SAFETY: validated and disjoint.
    let (positions, results) = unsafe { (view(positions_ptr, n * 3), view_mut(results_ptr, n)) };
    kernels::distances(positions, results, Vec3::new(ref_x, ref_y, ref_z));
    OK
}

#[wasm_bindgen(js_name = calcRainDropY)]
pub fn calc_rain_drop_y(start_y: f32, time: f32, speed: f32, cycle_height: f32) -> f32 {
    kernels::calc_rain_drop_y(start_y, time, speed, cycle_height)
}

/// Writes `[x, y, z]` to `out_ptr`, which must hold three floats.
#[wasm_bindgen(js_name = calcFloatingParticle)]
#[allow(clippy::too_many_arguments)]
pub fn calc_floating_particle(
    out_ptr: u32,
    base_x: f32,
    base_y: f32,
    base_z: f32,
    time: f32,
    offset: f32,
    amplitude: f32,
) -> u32 {
    if !validate("calcFloatingParticle", 1, &[(out_ptr, 3)]) {
        return REJECTED;
    }
    let p = kernels::calc_floating_particle(Vec3::new(base_x, base_y, base_z), time, offset, amplitude);
    // SAFETY: validated.
    unsafe { view_mut(out_ptr, 3) }.copy_from_slice(&p.to_array());
    OK
}
