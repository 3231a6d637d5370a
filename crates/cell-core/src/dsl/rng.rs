//! The `RNG` host object (C7): a deterministic xoroshiro128+ generator
//! exposed to script as `new RNG()`, `RNG.fromSeed()`, and `RNG.fromState()`.
//!
//! No `rand_xoshiro`-family crate is in the dependency stack, so the
//! generator is implemented directly against [`rand_core`]'s traits rather
//! than adding a crate for one named algorithm.

use rand_core::{RngCore, SeedableRng};

/// A xoroshiro128+ generator with explicit, inspectable state.
///
/// `state` is exposed to script so a build can persist and restore a
/// generator's exact sequence across runs (`RNG.fromState(rng.state)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xoroshiro128Plus {
    s0: u64,
    s1: u64,
}

fn splitmix64(seed: &mut u64) -> u64 {
    *seed = seed.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *seed;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

impl Xoroshiro128Plus {
    /// Derive a generator from a single `u64` seed via splitmix64, the
    /// standard way to expand a narrow seed into xoroshiro's 128 bits of
    /// state without ever landing on all-zero state (which would make the
    /// generator output all zeros forever).
    pub fn from_seed_u64(seed: u64) -> Self {
        let mut seed = seed;
        let s0 = splitmix64(&mut seed);
        let s1 = splitmix64(&mut seed);
        Self { s0, s1 }
    }

    /// Restore a generator from a previously observed `(s0, s1)` state
    /// pair. Both-zero state is rejected: it's a fixed point that only
    /// ever produces zero.
    pub fn from_state(s0: u64, s1: u64) -> Option<Self> {
        if s0 == 0 && s1 == 0 {
            None
        } else {
            Some(Self { s0, s1 })
        }
    }

    /// The generator's current `(s0, s1)` state pair.
    pub fn state(&self) -> (u64, u64) {
        (self.s0, self.s1)
    }

    /// Draw a uniform `f64` in `[0, 1)`, matching the engine's `Math.random`
    /// convention for exposing RNG output to script.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

impl RngCore for Xoroshiro128Plus {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let s0 = self.s0;
        let mut s1 = self.s1;
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.s0 = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.s1 = s1.rotate_left(37);

        result
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(8);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&self.next_u64().to_le_bytes());
        }
        let remainder = chunks.into_remainder();
        if !remainder.is_empty() {
            let tail = self.next_u64().to_le_bytes();
            remainder.copy_from_slice(&tail[..remainder.len()]);
        }
    }
}

impl SeedableRng for Xoroshiro128Plus {
    type Seed = [u8; 16];

    fn from_seed(seed: Self::Seed) -> Self {
        let s0 = u64::from_le_bytes(seed[..8].try_into().expect("8-byte slice"));
        let s1 = u64::from_le_bytes(seed[8..].try_into().expect("8-byte slice"));
        Self::from_state(s0, s1).unwrap_or_else(|| Self::from_seed_u64(0))
    }
}

use crate::js::{cell_error_to_js, js_error_to_cell, Bridge, HostHandle, HostRegistry};
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::PropertyDescriptor;
use boa_engine::{js_string, Context, JsNativeError, JsObject, JsValue, NativeFunction};
use cell_schema::CellError;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

fn entropy_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn register_method(
    context: &mut Context,
    object: &JsObject,
    name: &'static str,
    arity: u32,
    native: NativeFunction,
) -> Result<(), CellError> {
    let function = FunctionObjectBuilder::new(context.realm(), native)
        .name(js_string!(name))
        .length(arity)
        .build();
    object
        .set(js_string!(name), function, true, context)
        .map_err(|e| js_error_to_cell("<RNG>", &e))
}

fn build_rng_object(
    context: &mut Context,
    registry: Rc<RefCell<HostRegistry>>,
    handle: HostHandle,
) -> Result<JsObject, CellError> {
    let object = JsObject::with_null_proto();

    {
        let registry = Rc::clone(&registry);
        let random = NativeFunction::from_closure(move |_this, _args, _context| {
            let mut registry = registry.borrow_mut();
            let rng = registry
                .get_mut::<Xoroshiro128Plus>(handle)
                .ok_or_else(|| CellError::ToolFailure("RNG has already been disposed".to_string()))
                .map_err(cell_error_to_js)?;
            Ok(JsValue::from(rng.next_f64()))
        });
        register_method(context, &object, "random", 0, random)?;
    }

    {
        let registry = Rc::clone(&registry);
        let dispose = NativeFunction::from_closure(move |_this, _args, _context| {
            registry.borrow_mut().remove(handle);
            Ok(JsValue::undefined())
        });
        register_method(context, &object, "dispose", 0, dispose)?;
    }

    {
        let get_registry = Rc::clone(&registry);
        let getter = NativeFunction::from_closure(move |_this, _args, _context| {
            let registry = get_registry.borrow();
            let rng = registry
                .get::<Xoroshiro128Plus>(handle)
                .ok_or_else(|| CellError::ToolFailure("RNG has already been disposed".to_string()))
                .map_err(cell_error_to_js)?;
            let (s0, s1) = rng.state();
            Ok(JsValue::from(js_string!(format!("{s0:x}:{s1:x}"))))
        });
        let get_fn = FunctionObjectBuilder::new(context.realm(), getter)
            .name(js_string!("get state"))
            .length(0)
            .build();

        let set_registry = Rc::clone(&registry);
        let setter = NativeFunction::from_closure(move |_this, args, context| {
            let text = args
                .first()
                .cloned()
                .unwrap_or_else(JsValue::undefined)
                .to_string(context)?
                .to_std_string_escaped();
            let (s0_text, s1_text) = text
                .split_once(':')
                .ok_or_else(|| JsNativeError::typ().with_message("RNG.state: malformed state string").into())?;
            let s0 = u64::from_str_radix(s0_text, 16)
                .map_err(|_| JsNativeError::typ().with_message("RNG.state: malformed state string"))?;
            let s1 = u64::from_str_radix(s1_text, 16)
                .map_err(|_| JsNativeError::typ().with_message("RNG.state: malformed state string"))?;
            let restored = Xoroshiro128Plus::from_state(s0, s1)
                .ok_or_else(|| JsNativeError::typ().with_message("RNG.state: all-zero state is invalid"))?;
            let mut registry = set_registry.borrow_mut();
            if let Some(slot) = registry.get_mut::<Xoroshiro128Plus>(handle) {
                *slot = restored;
            }
            Ok(JsValue::undefined())
        });
        let set_fn = FunctionObjectBuilder::new(context.realm(), setter)
            .name(js_string!("set state"))
            .length(1)
            .build();

        let descriptor = PropertyDescriptor::builder()
            .get(get_fn)
            .set(set_fn)
            .enumerable(true)
            .configurable(true)
            .build();
        object
            .define_property_or_throw(js_string!("state"), descriptor, context)
            .map_err(|e| js_error_to_cell("<RNG>", &e))?;
    }

    Ok(object)
}

/// Register `RNG` (auto-seeded), `RNG.fromSeed(seed)`, and
/// `RNG.fromState(state)` as globals.
///
/// # Errors
///
/// Returns an error if the constructors can't be wired onto the global
/// object.
pub fn install(bridge: &mut Bridge, registry: Rc<RefCell<HostRegistry>>) -> Result<(), CellError> {
    let context = bridge.context_mut();

    let ctor_registry = Rc::clone(&registry);
    let ctor = NativeFunction::from_closure(move |_this, _args, context| {
        let rng = Xoroshiro128Plus::from_seed_u64(entropy_seed());
        let handle = ctor_registry.borrow_mut().insert(rng);
        build_rng_object(context, Rc::clone(&ctor_registry), handle).map(JsValue::from)
    });
    let rng_fn = FunctionObjectBuilder::new(context.realm(), ctor)
        .name(js_string!("RNG"))
        .length(0)
        .build();

    {
        let registry = Rc::clone(&registry);
        let from_seed = NativeFunction::from_closure(move |_this, args, context| {
            // A JS `number` is an IEEE-754 double: seeds wider than 2^53 lose
            // precision crossing the host boundary. Documented, not worked
            // around (see the Open Questions note this binding implements).
            let seed = args.first().cloned().unwrap_or_else(JsValue::undefined).to_number(context)? as u64;
            let rng = Xoroshiro128Plus::from_seed_u64(seed);
            let handle = registry.borrow_mut().insert(rng);
            build_rng_object(context, Rc::clone(&registry), handle).map(JsValue::from)
        });
        let from_seed_fn = FunctionObjectBuilder::new(context.realm(), from_seed)
            .name(js_string!("fromSeed"))
            .length(1)
            .build();
        rng_fn
            .set(js_string!("fromSeed"), from_seed_fn, true, context)
            .map_err(|e| js_error_to_cell("<RNG>", &e))?;
    }

    {
        let registry = Rc::clone(&registry);
        let from_state = NativeFunction::from_closure(move |_this, args, context| {
            let text = args
                .first()
                .cloned()
                .unwrap_or_else(JsValue::undefined)
                .to_string(context)?
                .to_std_string_escaped();
            let (s0_text, s1_text) = text
                .split_once(':')
                .ok_or_else(|| JsNativeError::typ().with_message("RNG.fromState: malformed state string").into())?;
            let s0 = u64::from_str_radix(s0_text, 16)
                .map_err(|_| JsNativeError::typ().with_message("RNG.fromState: malformed state string"))?;
            let s1 = u64::from_str_radix(s1_text, 16)
                .map_err(|_| JsNativeError::typ().with_message("RNG.fromState: malformed state string"))?;
            let rng = Xoroshiro128Plus::from_state(s0, s1)
                .ok_or_else(|| JsNativeError::typ().with_message("RNG.fromState: all-zero state is invalid"))?;
            let handle = registry.borrow_mut().insert(rng);
            build_rng_object(context, Rc::clone(&registry), handle).map(JsValue::from)
        });
        let from_state_fn = FunctionObjectBuilder::new(context.realm(), from_state)
            .name(js_string!("fromState"))
            .length(1)
            .build();
        rng_fn
            .set(js_string!("fromState"), from_state_fn, true, context)
            .map_err(|e| js_error_to_cell("<RNG>", &e))?;
    }

    let global = context.global_object();
    global
        .set(js_string!("RNG"), rng_fn, true, context)
        .map_err(|e| js_error_to_cell("<global>", &e))
}
