// Common test utilities for integration tests
//
// Every test builds its own bridge; nothing here touches process-wide
// state except the selector table, which is append-only.

#![allow(dead_code)]

use natbridge::runtime::encoding::Signature;
use natbridge::runtime::managed::{
    ManagedException, ManagedMethod, ManagedObject, ManagedRef, ManagedType, ManagedValue,
};
use natbridge::{Bridge, BridgeConfig, Handle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static UNIQUE: AtomicUsize = AtomicUsize::new(0);

/// Creates a fresh bridge with the default configuration.
pub fn bridge() -> Bridge {
    Bridge::new(BridgeConfig::default())
}

/// Returns `prefix` with a process-unique suffix.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", UNIQUE.fetch_add(1, Ordering::Relaxed))
}

/// Parses a signature.
pub fn sig(encoding: &str) -> Signature {
    Signature::parse(encoding).expect("test signature must parse")
}

/// A method returning a constant int, exposed under `selector`.
pub fn const_int_method(selector: &str, value: i32) -> ManagedMethod {
    ManagedMethod::new(selector, sig("i@:"), move |_| Ok(ManagedValue::Int(value)))
        .with_selector(selector)
}

/// `applyAsInt(a, b) -> a + b`.
pub fn int_adder() -> Arc<ManagedMethod> {
    Arc::new(ManagedMethod::new("applyAsInt", sig("i@:ii"), |call| {
        match (call.arg(0).as_int(), call.arg(1).as_int()) {
            (Some(a), Some(b)) => Ok(ManagedValue::Int(a + b)),
            _ => Err(ManagedException::new(
                "java.lang.IllegalArgumentException",
                "expected two ints",
            )),
        }
    }))
}

/// A method that always throws, exposed under `name`.
pub fn throwing(name: &str, encoding: &str) -> ManagedMethod {
    let owned = name.to_string();
    ManagedMethod::new(name, sig(encoding), move |_| {
        Err(ManagedException::new("java.lang.RuntimeException", "boom")
            .with_frame(format!("app.Callbacks.{owned}(Callbacks.java:12)"))
            .with_frame("app.Main.main(Main.java:3)"))
    })
    .with_selector(name)
}

/// [`throwing`], shared.
pub fn throwing_method(name: &str, encoding: &str) -> Arc<ManagedMethod> {
    Arc::new(throwing(name, encoding))
}

/// A managed functional object wrapped in a native block.
pub fn managed_block(bridge: &Bridge, method: &Arc<ManagedMethod>) -> (ManagedRef, Handle) {
    let ty = ManagedType::builder(unique_name("Functional")).build();
    let instance = ManagedObject::stateless(&ty);
    let block = bridge
        .create_native_callback_from_java_instance(&instance, method)
        .expect("block creation must succeed");
    (instance, block)
}

/// The "Widget" managed type with `size` and `describe` selectors.
pub fn widget_type() -> Arc<ManagedType> {
    ManagedType::builder(unique_name("app.Widget"))
        .method(const_int_method("size", 3))
        .method(
            ManagedMethod::new("describe", sig("@@:"), |call| {
                let s = call
                    .bridge()
                    .create_native_string("widget")
                    .map_err(|e| ManagedException::new("BridgeError", e.to_string()))?;
                call.bridge()
                    .autorelease(s)
                    .map_err(|e| ManagedException::new("BridgeError", e.to_string()))?;
                Ok(ManagedValue::Native(s))
            })
            .with_selector("describe"),
        )
        .build()
}
