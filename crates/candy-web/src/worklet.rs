//! Audio-worklet bridge: libopenmpt decoding and `MessagePort` delivery.
//!
//! The worklet script loads the libopenmpt Emscripten build, constructs a
//! [`TrackerWorklet`] with it and forwards `port.onmessage` data and every
//! `process()` call.

use candy_core::tracker::{
    DecoderFactory, PlaybackCursor, ProcessorConfig, TrackerDecoder, TrackerError, TrackerProcessor,
};
use candy_core::{Inbound, LoadRequest, MessageSink, Outbound};
use js_sys::{Float32Array, Reflect, Uint8Array, JSON};
use wasm_bindgen::prelude::*;
use web_sys::MessagePort;

const F32_BYTES: u32 = 4;

#[wasm_bindgen]
extern "C" {
    /// The libopenmpt Emscripten module object.
    #[derive(Clone)]
    pub type OpenMpt;

    #[wasm_bindgen(method, js_name = _malloc)]
    fn malloc(this: &OpenMpt, bytes: u32) -> u32;
    #[wasm_bindgen(method, js_name = _free)]
    fn free(this: &OpenMpt, ptr: u32);
    #[wasm_bindgen(method, getter, js_name = HEAPU8)]
    fn heap_u8(this: &OpenMpt) -> Uint8Array;
    #[wasm_bindgen(method, getter, js_name = HEAPF32)]
    fn heap_f32(this: &OpenMpt) -> Float32Array;
    #[wasm_bindgen(method, js_name = UTF8ToString)]
    fn utf8_to_string(this: &OpenMpt, ptr: u32) -> String;

    #[wasm_bindgen(method, js_name = _openmpt_module_create_from_memory)]
    fn module_create_from_memory(this: &OpenMpt, data: u32, size: u32, logfunc: u32, user: u32, ctls: u32) -> u32;
    #[wasm_bindgen(method, js_name = _openmpt_module_destroy)]
    fn module_destroy(this: &OpenMpt, module: u32);
    #[wasm_bindgen(method, js_name = _openmpt_free_string)]
    fn free_string(this: &OpenMpt, ptr: u32);

    #[wasm_bindgen(method, js_name = _openmpt_module_get_num_channels)]
    fn num_channels(this: &OpenMpt, module: u32) -> i32;
    #[wasm_bindgen(method, js_name = _openmpt_module_get_num_orders)]
    fn num_orders(this: &OpenMpt, module: u32) -> i32;
    #[wasm_bindgen(method, js_name = _openmpt_module_get_num_patterns)]
    fn num_patterns(this: &OpenMpt, module: u32) -> i32;
    #[wasm_bindgen(method, js_name = _openmpt_module_get_order_pattern)]
    fn order_pattern(this: &OpenMpt, module: u32, order: i32) -> i32;
    #[wasm_bindgen(method, js_name = _openmpt_module_get_pattern_num_rows)]
    fn pattern_num_rows(this: &OpenMpt, module: u32, pattern: i32) -> i32;
    #[wasm_bindgen(method, js_name = _openmpt_module_format_pattern_row_channel)]
    fn format_pattern_row_channel(
        this: &OpenMpt,
        module: u32,
        pattern: i32,
        row: i32,
        channel: i32,
        width: u32,
        pad: i32,
    ) -> u32;

    #[wasm_bindgen(method, js_name = _openmpt_module_get_current_order)]
    fn current_order(this: &OpenMpt, module: u32) -> i32;
    #[wasm_bindgen(method, js_name = _openmpt_module_get_current_row)]
    fn current_row(this: &OpenMpt, module: u32) -> i32;
    #[wasm_bindgen(method, js_name = _openmpt_module_get_current_estimated_bpm)]
    fn current_estimated_bpm(this: &OpenMpt, module: u32) -> f64;
    #[wasm_bindgen(method, js_name = _openmpt_module_get_current_channel_vu_mono)]
    fn current_channel_vu_mono(this: &OpenMpt, module: u32, channel: i32) -> f32;
    #[wasm_bindgen(method, js_name = _openmpt_module_read_float_stereo)]
    fn read_float_stereo(this: &OpenMpt, module: u32, rate: i32, count: u32, left: u32, right: u32) -> u32;
}

/// One loaded module plus its scratch render buffers on the libopenmpt heap.
pub struct OpenMptDecoder {
    lib: OpenMpt,
    module: u32,
    num_patterns: i32,
    left_ptr: u32,
    right_ptr: u32,
    capacity: usize,
}

impl OpenMptDecoder {
    fn ensure_capacity(&mut self, frames: usize) -> bool {
        if frames <= self.capacity {
            return true;
        }
        self.release_buffers();
        let bytes = frames as u32 * F32_BYTES;
        let left = self.lib.malloc(bytes);
        let right = self.lib.malloc(bytes);
        if left == 0 || right == 0 {
            for ptr in [left, right].into_iter().filter(|p| *p != 0) {
                self.lib.free(ptr);
            }
            log::error!("[openmpt] could not allocate {} frame render buffers", frames);
            return false;
        }
        self.left_ptr = left;
        self.right_ptr = right;
        self.capacity = frames;
        true
    }

    fn release_buffers(&mut self) {
        for ptr in [self.left_ptr, self.right_ptr] {
            if ptr != 0 {
                self.lib.free(ptr);
            }
        }
        self.left_ptr = 0;
        self.right_ptr = 0;
        self.capacity = 0;
    }

    fn copy_out(&self, ptr: u32, out: &mut [f32]) {
        let start = ptr / F32_BYTES;
        self.lib
            .heap_f32()
            .subarray(start, start + out.len() as u32)
            .copy_to(out);
    }
}

impl TrackerDecoder for OpenMptDecoder {
    fn num_channels(&self) -> usize {
        self.lib.num_channels(self.module).max(0) as usize
    }

    fn num_orders(&self) -> usize {
        self.lib.num_orders(self.module).max(0) as usize
    }

    fn order_pattern(&self, order: usize) -> Option<usize> {
        let pattern = self.lib.order_pattern(self.module, order as i32);
        // Skip (+++) and end (---) markers sit past the last real pattern
        (0..self.num_patterns).contains(&pattern).then_some(pattern as usize)
    }

    fn pattern_rows(&self, pattern: usize) -> usize {
        self.lib.pattern_num_rows(self.module, pattern as i32).max(0) as usize
    }

    fn format_cell(&self, pattern: usize, row: usize, channel: usize) -> String {
        let ptr = self
            .lib
            .format_pattern_row_channel(self.module, pattern as i32, row as i32, channel as i32, 0, 1);
        if ptr == 0 {
            return String::new();
        }
        let text = self.lib.utf8_to_string(ptr);
        self.lib.free_string(ptr);
        text
    }

    fn cursor(&self) -> PlaybackCursor {
        PlaybackCursor {
            order: self.lib.current_order(self.module).max(0) as usize,
            row: self.lib.current_row(self.module).max(0) as usize,
            bpm: self.lib.current_estimated_bpm(self.module) as f32,
        }
    }

    fn channel_vu(&self, channel: usize) -> f32 {
        self.lib.current_channel_vu_mono(self.module, channel as i32)
    }

    fn render(&mut self, sample_rate: u32, left: &mut [f32], right: &mut [f32]) -> usize {
        let frames = left.len().min(right.len());
        if frames == 0 || !self.ensure_capacity(frames) {
            return 0;
        }
        let rendered = self.lib.read_float_stereo(
            self.module,
            sample_rate as i32,
            frames as u32,
            self.left_ptr,
            self.right_ptr,
        ) as usize;
        let rendered = rendered.min(frames);
        if rendered > 0 {
            self.copy_out(self.left_ptr, &mut left[..rendered]);
            self.copy_out(self.right_ptr, &mut right[..rendered]);
        }
        rendered
    }
}

impl Drop for OpenMptDecoder {
    fn drop(&mut self) {
        self.release_buffers();
        self.lib.module_destroy(self.module);
    }
}

pub struct OpenMptFactory {
    lib: OpenMpt,
}

impl DecoderFactory for OpenMptFactory {
    fn open(&self, bytes: &[u8], file_name: &str) -> Result<Box<dyn TrackerDecoder>, TrackerError> {
        if bytes.is_empty() {
            return Err(TrackerError::Empty(file_name.to_string()));
        }
        let size = u32::try_from(bytes.len()).map_err(|_| TrackerError::Decode {
            name: file_name.to_string(),
            reason: "file too large".into(),
        })?;
        let data = self.lib.malloc(size);
        if data == 0 {
            return Err(TrackerError::Unavailable(format!("could not copy {size} bytes into libopenmpt")));
        }
        self.lib.heap_u8().set(&Uint8Array::from(bytes), data);
        let module = self.lib.module_create_from_memory(data, size, 0, 0, 0);
        self.lib.free(data);
        if module == 0 {
            return Err(TrackerError::Decode {
                name: file_name.to_string(),
                reason: "libopenmpt rejected the data".into(),
            });
        }
        let num_patterns = self.lib.num_patterns(module);
        Ok(Box::new(OpenMptDecoder {
            lib: self.lib.clone(),
            module,
            num_patterns,
            left_ptr: 0,
            right_ptr: 0,
            capacity: 0,
        }))
    }
}

/// Posts outbound messages as plain JS objects, encoded through JSON.
pub struct PortSink {
    port: MessagePort,
}

impl MessageSink for PortSink {
    fn post(&mut self, message: Outbound) {
        let value = match message.to_json() {
            Ok(json) => match JSON::parse(&json) {
                Ok(v) => v,
                Err(e) => {
                    log::error!("[worklet] could not parse encoded message: {:?}", e);
                    return;
                }
            },
            Err(e) => {
                log::error!("[worklet] could not encode message: {}", e);
                return;
            }
        };
        if let Err(e) = self.port.post_message(&value) {
            log::warn!("[worklet] postMessage failed: {:?}", e);
        }
    }
}

/// Read `{type, data}` from a port message. `LOAD` carries an `ArrayBuffer`,
/// so it is unpacked by hand instead of through serde.
fn inbound_from_js(data: &JsValue) -> Option<Inbound> {
    let kind = Reflect::get(data, &"type".into()).ok()?.as_string()?;
    match kind.as_str() {
        "LOAD" => {
            let payload = Reflect::get(data, &"data".into()).ok()?;
            let file_data = Reflect::get(&payload, &"fileData".into()).ok()?;
            let file_name = Reflect::get(&payload, &"fileName".into())
                .ok()
                .and_then(|v| v.as_string())
                .unwrap_or_default();
            Some(Inbound::Load(LoadRequest {
                file_data: Uint8Array::new(&file_data).to_vec(),
                file_name,
            }))
        }
        "STOP" => Some(Inbound::Stop),
        _ => None,
    }
}

#[wasm_bindgen]
pub struct TrackerWorklet {
    processor: TrackerProcessor<OpenMptFactory>,
    sink: PortSink,
}

#[wasm_bindgen]
impl TrackerWorklet {
    #[wasm_bindgen(constructor)]
    pub fn new(lib: OpenMpt, port: MessagePort, sample_rate: f32) -> TrackerWorklet {
        let config = ProcessorConfig {
            sample_rate: sample_rate.round().max(1.0) as u32,
        };
        log::info!("[worklet] created at {} Hz", config.sample_rate);
        Self {
            processor: TrackerProcessor::new(OpenMptFactory { lib }, config),
            sink: PortSink { port },
        }
    }

    /// Post `READY` once the worklet script is wired up.
    #[wasm_bindgen(js_name = announceReady)]
    pub fn announce_ready(&mut self) {
        self.processor.announce_ready(&mut self.sink);
    }

    /// Feed `event.data` from `port.onmessage`.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&mut self, data: JsValue) {
        match inbound_from_js(&data) {
            Some(message) => self.processor.handle_message(message),
            None => log::warn!("[worklet] ignoring unrecognised message"),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn playing(&self) -> bool {
        self.processor.is_playing()
    }

    /// Render one block into the output channels; always keeps the node alive.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) -> bool {
        self.processor.process(left, right, &mut self.sink)
    }
}
