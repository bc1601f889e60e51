//! WASM bindings for `propagator_core`.

mod system;

pub use system::WasmNetwork;

use propagator_core::equation_engine::solve_str;
use std::collections::HashMap;
use system::to_js;
use wasm_bindgen::prelude::*;

/// Solves `equations` for `unknown`, given `known` as a `{ name: value }`
/// object (or `undefined`).
#[wasm_bindgen]
pub fn solve(equations: Vec<String>, unknown: &str, known: JsValue) -> Result<f64, JsValue> {
    console_error_panic_hook::set_once();

    let known: HashMap<String, f64> = if known.is_undefined() || known.is_null() {
        HashMap::new()
    } else {
        serde_wasm_bindgen::from_value(known)
            .map_err(|err| JsValue::from_str(&format!("Invalid known values: {err}")))?
    };
    solve_str(&equations, unknown, &known).map_err(to_js)
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::{solve, WasmNetwork};
    use js_sys::{Object, Reflect};
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    fn known(pairs: &[(&str, f64)]) -> JsValue {
        let obj = Object::new();
        for (name, value) in pairs {
            Reflect::set(&obj, &JsValue::from_str(name), &JsValue::from_f64(*value))
                .expect("set property");
        }
        obj.into()
    }

    #[wasm_bindgen_test]
    fn solve_reads_known_object() {
        let value = solve(
            vec!["F = m * a".to_string()],
            "a",
            known(&[("F", 10.0), ("m", 2.0)]),
        )
        .expect("solvable");
        assert_eq!(value, 5.0);
    }

    #[wasm_bindgen_test]
    fn solve_accepts_undefined_known() {
        let value = solve(
            vec![
                "A - B = C".to_string(),
                "A = 10".to_string(),
                "C = 2".to_string(),
            ],
            "B",
            JsValue::UNDEFINED,
        )
        .expect("solvable");
        assert_eq!(value, 8.0);
    }

    #[wasm_bindgen_test]
    fn solve_reports_undetermined_unknown() {
        let message = solve(vec!["F = m * a".to_string()], "a", JsValue::UNDEFINED)
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Failed to solve for 'a'"));
        assert!(message.contains("has no value"));
    }

    #[wasm_bindgen_test]
    fn values_serializes_to_plain_object() {
        let mut network = WasmNetwork::new(vec!["A / B = C".to_string()]).expect("network");
        network.set("B", 10.0).expect("B");
        network.set("C", 2.0).expect("C");

        let values = network.values().expect("values");
        let a = Reflect::get(&values, &JsValue::from_str("A")).expect("A");
        assert_eq!(a.as_f64(), Some(20.0));
    }

    #[wasm_bindgen_test]
    fn constructor_compares_exactly() {
        let mut network = WasmNetwork::new(vec!["x = 0.3".to_string()]).expect("network");
        assert!(network.set("x", 0.1 + 0.2).is_err());
    }

    #[wasm_bindgen_test]
    fn with_settings_applies_tolerance() {
        let settings = known(&[("tolerance", 1e-9)]);
        let mut network =
            WasmNetwork::with_settings(vec!["x = 0.3".to_string()], settings).expect("network");
        network.set("x", 0.1 + 0.2).expect("within tolerance");
        assert!(network.set("x", 0.4).is_err());
    }
}
