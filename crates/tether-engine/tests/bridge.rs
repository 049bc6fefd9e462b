//! End-to-end tests for the invocation bridge

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use parking_lot::Mutex;
use tether_engine::{Bridge, BridgeConfig, ContextHandle, ContextThread, RunLoop};
use tether_sdk::{
    dyn_args, BridgeError, BridgeResult, CallResult, ClassDef, ClassRegistry, DynValue, Number,
    ObjectRef, ValueType,
};

// ============================================================================
// Fixtures
// ============================================================================

struct Point {
    x: Mutex<f64>,
    y: Mutex<f64>,
    owner: String,
}

impl Point {
    fn new(x: f64, y: f64) -> Self {
        Point {
            x: Mutex::new(x),
            y: Mutex::new(y),
            owner: thread_name(),
        }
    }
}

/// Bounces calls between two contexts
struct Relay {
    peer: OnceLock<(Bridge, ContextHandle, ObjectRef)>,
}

fn thread_name() -> String {
    thread::current().name().unwrap_or("").to_string()
}

fn point_class(inits: Arc<AtomicUsize>) -> ClassDef<Point> {
    ClassDef::<Point>::new("Point")
        .initializer("initWithX:Y:", &[ValueType::F64, ValueType::F64], move |args| {
            inits.fetch_add(1, Ordering::SeqCst);
            Ok(Point::new(args.f64(0)?, args.f64(1)?))
        })
        .initializer("initWithRadius:", &[ValueType::F64], |args| {
            let r = args.f64(0)?;
            if r < 0.0 {
                return Err(BridgeError::Operation(format!("negative radius {}", r)));
            }
            Ok(Point::new(r, 0.0))
        })
        .property(
            "x",
            ValueType::F64,
            |p| Ok(*p.x.lock()),
            |p, args| {
                *p.x.lock() = args.f64(0)?;
                Ok(())
            },
        )
        .readonly_property("y", ValueType::F64, |p| Ok(*p.y.lock()))
        .readonly_property("owner", ValueType::String, |p| Ok(p.owner.clone()))
        .property_accessors("abscissa", "x", Some("setX:"))
        .method("translateBy:", &[ValueType::F64], ValueType::Void, |p, args| {
            let d = args.f64(0)?;
            *p.x.lock() += d;
            *p.y.lock() += d;
            Ok(())
        })
        .method("currentThread", &[], ValueType::String, |_, _| Ok(thread_name()))
        .method("crash", &[], ValueType::Void, |_, _| -> BridgeResult<()> {
            panic!("point crashed")
        })
        .method("address", &[], ValueType::Pointer, |_, _| Ok(()))
        .class_method("origin", &[], ValueType::Object, |_| {
            Ok(ObjectRef::new(Point::new(0.0, 0.0)))
        })
}

fn relay_class() -> ClassDef<Relay> {
    ClassDef::<Relay>::new("Relay")
        .initializer("init", &[], |_| {
            Ok(Relay {
                peer: OnceLock::new(),
            })
        })
        .method("bounce:", &[ValueType::I32], ValueType::I32, |relay, args| {
            let remaining: i32 = args.get(0)?;
            if remaining == 0 {
                return Ok(0);
            }
            let (bridge, context, peer) = relay
                .peer
                .get()
                .ok_or_else(|| BridgeError::Operation("relay has no peer".into()))?;
            let hops = bridge.call_on(context, peer, "bounce:", dyn_args![remaining - 1])?;
            let hops = hops.as_number().and_then(|n| n.as_i64()).unwrap_or(-1);
            Ok(hops as i32 + 1)
        })
}

fn bridge_with(inits: Arc<AtomicUsize>, timeout_ms: u64) -> Bridge {
    let mut registry = ClassRegistry::new();
    registry.register(point_class(inits));
    registry.register(relay_class());
    let config = BridgeConfig {
        sync_timeout_ms: timeout_ms,
        default_context: None,
    };
    Bridge::new(registry, &config)
}

fn bridge() -> Bridge {
    bridge_with(Arc::new(AtomicUsize::new(0)), 5_000)
}

fn point(bridge: &Bridge, x: f64, y: f64) -> ObjectRef {
    bridge
        .construct("Point", "initWithX:Y:", dyn_args![x, y])
        .unwrap()
}

fn x_of(obj: &ObjectRef) -> f64 {
    *obj.downcast_ref::<Point>().unwrap().x.lock()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_construct_point_on_context() {
    let bridge = bridge();
    let ui = ContextThread::spawn("ui").unwrap();

    let point = bridge
        .construct_on(&ui.handle(), "Point", "initWithX:Y:", dyn_args![3, 4])
        .unwrap();

    let p = point.downcast_ref::<Point>().unwrap();
    assert_eq!(*p.x.lock(), 3.0);
    assert_eq!(*p.y.lock(), 4.0);
    assert_eq!(p.owner, "tether-ui");
}

#[test]
fn test_construction_failure() {
    let bridge = bridge();
    let err = bridge
        .construct("Point", "initWithRadius:", dyn_args![-1.0])
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::ConstructionFailure { ref class, ref reason }
            if class == "Point" && reason.contains("negative radius")
    ));
}

#[test]
fn test_unknown_class() {
    let bridge = bridge();
    assert_eq!(
        bridge.construct("Line", "init", dyn_args![]).unwrap_err(),
        BridgeError::UnresolvedClass("Line".into())
    );
}

#[test]
fn test_rejected_builds_run_nothing() {
    let inits = Arc::new(AtomicUsize::new(0));
    let bridge = bridge_with(inits.clone(), 5_000);

    let err = bridge
        .construct("Point", "initWithZ:", dyn_args![1])
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnresolvedOperation { .. }));

    let err = bridge
        .construct("Point", "initWithX:Y:", dyn_args![1])
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentMismatch { .. }));

    let err = bridge
        .construct("Point", "initWithX:Y:", dyn_args![1, "two"])
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentMismatch { .. }));

    assert_eq!(inits.load(Ordering::SeqCst), 0);
    point(&bridge, 0.0, 0.0);
    assert_eq!(inits.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Calls
// ============================================================================

#[test]
fn test_numeric_accessor() {
    let bridge = bridge();
    let p = point(&bridge, 1.5, 2.0);
    let result = bridge.call(&p, "x", dyn_args![]).unwrap();
    assert_eq!(result, CallResult::Number(Number::Float(1.5)));
}

#[test]
fn test_void_method() {
    let bridge = bridge();
    let p = point(&bridge, 1.0, 1.0);
    let result = bridge.call(&p, "translateBy:", dyn_args![2]).unwrap();
    assert_eq!(result, CallResult::Void);
    assert_eq!(x_of(&p), 3.0);
}

#[test]
fn test_unknown_operation() {
    let bridge = bridge();
    let p = point(&bridge, 0.0, 0.0);
    let err = bridge.call(&p, "rotate:", dyn_args![90]).unwrap_err();
    assert_eq!(
        err,
        BridgeError::UnresolvedOperation {
            class: "Point".into(),
            operation: "rotate:".into()
        }
    );
}

#[test]
fn test_unsupported_return_type() {
    let bridge = bridge();
    let p = point(&bridge, 0.0, 0.0);
    assert!(matches!(
        bridge.call(&p, "address", dyn_args![]),
        Err(BridgeError::UnsupportedType { .. })
    ));
}

#[test]
fn test_unregistered_target() {
    let bridge = bridge();
    let stranger = ObjectRef::new(String::from("not a class"));
    assert!(matches!(
        bridge.call(&stranger, "x", dyn_args![]),
        Err(BridgeError::UnresolvedClass(_))
    ));
}

#[test]
fn test_class_method() {
    let bridge = bridge();
    let origin = bridge
        .call_class("Point", "origin", dyn_args![])
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(x_of(&origin), 0.0);
}

#[test]
fn test_descriptor_runs_exactly_what_it_resolved() {
    let bridge = bridge();
    let p = point(&bridge, 1.0, 1.0);
    let other = point(&bridge, 1.0, 1.0);

    let call = bridge
        .builder()
        .build_call(&p, "translateBy:", dyn_args![3])
        .unwrap();
    let operation = Arc::clone(call.operation());
    let declared = bridge.registry().class_named("Point").unwrap();
    assert!(Arc::ptr_eq(&operation, declared.method("translateBy:").unwrap()));
    assert!(call.target().instance().unwrap().ptr_eq(&p));

    let worker = ContextThread::spawn("exact").unwrap();
    let result = bridge
        .dispatcher()
        .execute(call.on(worker.handle()))
        .unwrap();
    assert_eq!(result, CallResult::Void);
    assert_eq!(x_of(&p), 4.0);
    assert_eq!(x_of(&other), 1.0);
    assert_eq!(operation.name(), "translateBy:");
}

#[test]
fn test_call_on_runs_on_target_thread() {
    let bridge = bridge();
    let worker = ContextThread::spawn("worker").unwrap();
    let p = point(&bridge, 0.0, 0.0);
    let result = bridge
        .call_on(&worker.handle(), &p, "currentThread", dyn_args![])
        .unwrap();
    assert_eq!(result.into_dyn(), DynValue::String("tether-worker".into()));
}

#[test]
fn test_sync_equals_sync_on_current() {
    let bridge = bridge();
    let run_loop = RunLoop::new("main");
    let handle = run_loop.handle();
    let p = point(&bridge, 7.0, 1.0);
    let (tx, rx) = channel::bounded(1);

    let (b, h, target) = (bridge.clone(), handle.clone(), p.clone());
    handle
        .perform(move || {
            let local = b.call(&target, "currentThread", dyn_args![]);
            let routed = b.call_on(&h, &target, "currentThread", dyn_args![]);
            let x_local = b.call(&target, "x", dyn_args![]);
            let x_routed = b.call_on(&h, &target, "x", dyn_args![]);
            let _ = tx.send((local, routed, x_local, x_routed));
        })
        .unwrap();
    assert_eq!(run_loop.run_until_idle(), 1);

    let (local, routed, x_local, x_routed) = rx.try_recv().unwrap();
    assert_eq!(local.unwrap().into_dyn(), routed.unwrap().into_dyn());
    assert_eq!(x_local.unwrap(), x_routed.unwrap());
}

#[test]
fn test_operation_panic_on_context() {
    let bridge = bridge();
    let worker = ContextThread::spawn("fragile").unwrap();
    let p = point(&bridge, 0.0, 0.0);

    let err = bridge
        .call_on(&worker.handle(), &p, "crash", dyn_args![])
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Panicked { ref operation, ref message }
            if operation == "Point.crash" && message == "point crashed"
    ));

    // The loop survives
    assert!(bridge
        .call_on(&worker.handle(), &p, "x", dyn_args![])
        .is_ok());
}

// ============================================================================
// Async
// ============================================================================

#[test]
fn test_async_visible_after_loop_runs() {
    let bridge = bridge();
    let run_loop = RunLoop::new("deferred");
    let p = point(&bridge, 0.0, 0.0);

    bridge
        .async_call_on(&run_loop.handle(), &p, "translateBy:", dyn_args![5])
        .unwrap();
    assert_eq!(x_of(&p), 0.0);

    run_loop.run_until_idle();
    assert_eq!(x_of(&p), 5.0);
}

#[test]
fn test_async_from_loop_is_queued_behind_current_job() {
    let bridge = bridge();
    let run_loop = RunLoop::new("main");
    let p = point(&bridge, 0.0, 0.0);
    let seen = Arc::new(Mutex::new(None));

    let (b, target, during) = (bridge.clone(), p.clone(), seen.clone());
    run_loop
        .handle()
        .perform(move || {
            b.async_call(&target, "translateBy:", dyn_args![1]).unwrap();
            *during.lock() = Some(x_of(&target));
        })
        .unwrap();

    assert_eq!(run_loop.run_until_idle(), 2);
    assert_eq!(*seen.lock(), Some(0.0));
    assert_eq!(x_of(&p), 1.0);
}

#[test]
fn test_async_fifo_then_sync_barrier() {
    let bridge = bridge();
    let worker = ContextThread::spawn("fifo").unwrap();
    let p = point(&bridge, 0.0, 0.0);

    for _ in 0..10 {
        bridge
            .async_call_on(&worker.handle(), &p, "translateBy:", dyn_args![1])
            .unwrap();
    }
    // A sync call on the same context runs after every queued async call
    let x = bridge
        .call_on(&worker.handle(), &p, "x", dyn_args![])
        .unwrap();
    assert_eq!(x, CallResult::Number(Number::Float(10.0)));
}

#[test]
fn test_async_uses_default_context() {
    let background = ContextThread::spawn("background").unwrap();
    let mut registry = ClassRegistry::new();
    registry.register(point_class(Arc::new(AtomicUsize::new(0))));
    let dispatcher = tether_engine::Dispatcher::with_timeout(Duration::from_secs(5))
        .with_default_context(background.handle());
    let bridge = Bridge::with_dispatcher(registry, dispatcher);
    let p = point(&bridge, 0.0, 0.0);

    bridge
        .async_call(&p, "translateBy:", dyn_args![2])
        .unwrap();
    bridge
        .call_on(&background.handle(), &p, "x", dyn_args![])
        .unwrap();
    assert_eq!(x_of(&p), 2.0);
}

#[test]
fn test_configured_default_context_receives_async_calls() {
    let mut registry = ClassRegistry::new();
    registry.register(point_class(Arc::new(AtomicUsize::new(0))));
    let config = BridgeConfig {
        sync_timeout_ms: 5_000,
        default_context: Some("configured".into()),
    };
    let bridge = Bridge::from_config(registry, &config).unwrap();
    let background = bridge.background_context().unwrap();
    assert_eq!(background.name(), "configured");
    assert_eq!(bridge.dispatcher().default_context(), Some(background.clone()));

    let p = point(&bridge, 0.0, 0.0);
    let (tx, rx) = channel::bounded(1);
    bridge.async_call(&p, "translateBy:", dyn_args![1]).unwrap();
    background
        .perform(move || {
            let _ = tx.send(thread_name());
        })
        .unwrap();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        "tether-configured"
    );
    assert_eq!(x_of(&p), 1.0);

    drop(bridge);
    assert!(background.is_closed());
}

#[test]
fn test_bridge_without_default_context() {
    let bridge = Bridge::from_config(ClassRegistry::new(), &BridgeConfig::default()).unwrap();
    assert!(bridge.background_context().is_none());
    assert!(bridge.dispatcher().default_context().is_none());
}

#[test]
fn test_async_to_closed_context() {
    let bridge = bridge();
    let handle = RunLoop::new("gone").handle();
    let p = point(&bridge, 0.0, 0.0);
    assert_eq!(
        bridge
            .async_call_on(&handle, &p, "translateBy:", dyn_args![1])
            .unwrap_err(),
        BridgeError::ContextClosed("gone".into())
    );
}

// ============================================================================
// Blocking hand-off
// ============================================================================

#[test]
fn test_unserviced_context_times_out() {
    let bridge = bridge_with(Arc::new(AtomicUsize::new(0)), 50);
    let stalled = RunLoop::new("stalled");
    let p = point(&bridge, 0.0, 0.0);

    let err = bridge
        .call_on(&stalled.handle(), &p, "translateBy:", dyn_args![1])
        .unwrap_err();
    assert_eq!(
        err,
        BridgeError::DeadlockRisk {
            context: "stalled".into(),
            timeout: Duration::from_millis(50)
        }
    );

    // The abandoned call never takes effect
    stalled.run_until_idle();
    assert_eq!(x_of(&p), 0.0);
}

#[test]
fn test_mutual_sync_calls_do_not_deadlock() {
    let bridge = bridge();
    let a = ContextThread::spawn("a").unwrap();
    let b = ContextThread::spawn("b").unwrap();

    let relay_a = bridge
        .construct_on(&a.handle(), "Relay", "init", dyn_args![])
        .unwrap();
    let relay_b = bridge
        .construct_on(&b.handle(), "Relay", "init", dyn_args![])
        .unwrap();
    let _ = relay_a
        .downcast_ref::<Relay>()
        .unwrap()
        .peer
        .set((bridge.clone(), b.handle(), relay_b.clone()));
    let _ = relay_b
        .downcast_ref::<Relay>()
        .unwrap()
        .peer
        .set((bridge.clone(), a.handle(), relay_a.clone()));

    // a -> b -> a -> b -> a: each hop blocks while the other side calls back
    let hops = bridge
        .call_on(&a.handle(), &relay_a, "bounce:", dyn_args![4])
        .unwrap();
    assert_eq!(hops, CallResult::Number(Number::Int(4)));
}

// ============================================================================
// Invocation objects and properties
// ============================================================================

#[test]
fn test_invocation_routes_to_bound_context() {
    let bridge = bridge();
    let worker = ContextThread::spawn("bound").unwrap();
    let p = point(&bridge, 0.0, 0.0);

    let invocation = bridge.invocation(p.clone(), Some(worker.handle()));
    let result = invocation.call("currentThread", dyn_args![]).unwrap();
    assert_eq!(result.into_dyn(), DynValue::String("tether-bound".into()));

    invocation.async_call("translateBy:", dyn_args![3]).unwrap();
    assert_eq!(
        invocation.value_of("x").unwrap(),
        CallResult::Number(Number::Float(3.0))
    );
}

#[test]
fn test_property_access() {
    let bridge = bridge();
    let p = point(&bridge, 1.0, 2.0);
    let invocation = bridge.invocation(p.clone(), None);

    assert_eq!(
        invocation.value_of("y").unwrap(),
        CallResult::Number(Number::Float(2.0))
    );
    invocation.set_value("x", 9.5).unwrap();
    assert_eq!(x_of(&p), 9.5);

    invocation.set_value("abscissa", 4).unwrap();
    assert_eq!(
        invocation.value_of("abscissa").unwrap(),
        CallResult::Number(Number::Float(4.0))
    );
}

#[test]
fn test_property_errors() {
    let bridge = bridge();
    let p = point(&bridge, 1.0, 2.0);
    let invocation = bridge.invocation(p, None);

    assert_eq!(
        invocation.set_value("y", 1.0).unwrap_err(),
        BridgeError::ReadOnlyProperty {
            class: "Point".into(),
            property: "y".into()
        }
    );
    assert!(matches!(
        invocation.value_of("z"),
        Err(BridgeError::UnresolvedOperation { .. })
    ));
    assert!(matches!(
        invocation.set_value("x", "wide"),
        Err(BridgeError::ArgumentMismatch { .. })
    ));
}

#[test]
fn test_string_property_returns_object() {
    let bridge = bridge();
    let ui = ContextThread::spawn("painter").unwrap();
    let p = bridge
        .construct_on(&ui.handle(), "Point", "initWithX:Y:", dyn_args![0, 0])
        .unwrap();
    let owner = bridge.invocation(p, None).value_of("owner").unwrap();
    assert!(owner.as_object().is_some());
    assert_eq!(owner.into_dyn(), DynValue::String("tether-painter".into()));
}
