//! Core WASM network wrapper and low-level utilities.

use anyhow::Context;
use propagator_core::equation_engine::{parse_equation, NetworkBuilder};
use propagator_core::network::NetworkSettings;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmNetwork {
    pub(crate) builder: NetworkBuilder,
}

pub(crate) fn to_js(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

pub(crate) fn build_network(
    equations: &[String],
    settings: NetworkSettings,
) -> anyhow::Result<NetworkBuilder> {
    let mut builder = NetworkBuilder::with_settings(settings);
    for (idx, src) in equations.iter().enumerate() {
        let equation =
            parse_equation(src).with_context(|| format!("Equation {} ('{src}')", idx + 1))?;
        builder
            .add_equation(&equation)
            .with_context(|| format!("Equation {} ('{src}')", idx + 1))?;
    }
    Ok(builder)
}

#[wasm_bindgen]
impl WasmNetwork {
    #[wasm_bindgen(constructor)]
    pub fn new(equations: Vec<String>) -> Result<WasmNetwork, JsValue> {
        console_error_panic_hook::set_once();

        let builder = build_network(&equations, NetworkSettings::default()).map_err(to_js)?;
        Ok(WasmNetwork { builder })
    }

    /// Like `new`, with `{ tolerance, max_depth }` settings; missing fields
    /// keep their defaults.
    pub fn with_settings(equations: Vec<String>, settings: JsValue) -> Result<WasmNetwork, JsValue> {
        console_error_panic_hook::set_once();

        let settings: NetworkSettings = if settings.is_undefined() || settings.is_null() {
            NetworkSettings::default()
        } else {
            serde_wasm_bindgen::from_value(settings)
                .map_err(|err| JsValue::from_str(&format!("Invalid settings: {err}")))?
        };
        let builder = build_network(&equations, settings).map_err(to_js)?;
        Ok(WasmNetwork { builder })
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<(), JsValue> {
        self.builder
            .set(name, value)
            .with_context(|| format!("Setting '{name}'"))
            .map_err(to_js)
    }

    pub fn forget(&mut self, name: &str) -> Result<(), JsValue> {
        self.builder
            .forget(name)
            .with_context(|| format!("Forgetting '{name}'"))
            .map_err(to_js)
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.builder.has_value(name)
    }

    /// Value of `name`, or `undefined` when the network has not determined it.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.builder.value(name).ok()
    }

    pub fn variables(&self) -> Vec<String> {
        self.builder.variables()
    }

    /// Every determined variable as a `{ name: value }` object.
    pub fn values(&self) -> Result<JsValue, JsValue> {
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        serde::Serialize::serialize(&self.builder.values(), &serializer)
            .map_err(|err| JsValue::from_str(&format!("Failed to serialize values: {err}")))
    }
}
