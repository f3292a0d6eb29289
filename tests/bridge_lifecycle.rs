//! End-to-end lifecycle behavior against scripted boundary doubles:
//! context negotiation, buffer paths, resize, error latching and the
//! activation handshake.

mod common;

use std::sync::Arc;

use glam::Vec3;

use common::{default_matrices, run_frame, EventLog, MockPlatform, MockRaster, RecordingClient};
use gpu_bridge::host::Aabb;
use gpu_bridge::node::ClientSlot;
use gpu_bridge::{BridgeNode, DataVariance, RenderContextId, Viewport};

fn node_with_client(
    platform: Arc<MockPlatform>,
    client: Arc<RecordingClient>,
) -> Arc<BridgeNode> {
    let node = BridgeNode::new(platform);
    node.attach_client(&ClientSlot::new(client));
    node
}

#[test]
fn interop_context_preferred_and_built_lazily() {
    let log = EventLog::new();
    let node = node_with_client(MockPlatform::sharing(log.clone()), RecordingClient::unit(log.clone()));
    let mut raster = MockRaster::new(0, 512, 512, log.clone());

    // Nothing happens before the first frame.
    assert_eq!(log.snapshot().len(), 0);

    let (mv, pm) = default_matrices();
    run_frame(&node, &mut raster, mv, pm);

    let events = log.take();
    assert_eq!(events[0], "raster.finish"); // barrier before any dispatch
    assert!(events.contains(&"platform.enumerate".to_string()));
    assert!(events.contains(&"platform.create dev0 interop=true".to_string()));
    assert!(events.contains(&"client.build on mock-gpu".to_string()));
    assert!(events.contains(&"context.wrap 512x512".to_string()));
    assert!(events.contains(&"client.bind 512x512 zero_copy=true".to_string()));
    assert!(events.contains(&"queue.acquire 512x512".to_string()));
    assert!(events.contains(&"client.dispatch 512x512 Perspective".to_string()));
    assert!(events.contains(&"queue.release 512x512".to_string()));
    assert!(events.contains(&"raster.present 512x512".to_string()));
    // Zero-copy path never stages through the host.
    assert!(!events.iter().any(|e| e.starts_with("queue.read_back")));
    assert!(!events.iter().any(|e| e.starts_with("raster.upload")));
}

#[test]
fn falls_back_to_copy_through_when_interop_refused() {
    let log = EventLog::new();
    let node = node_with_client(
        MockPlatform::copy_through(log.clone()),
        RecordingClient::unit(log.clone()),
    );
    let mut raster = MockRaster::new(0, 32, 32, log.clone());

    let (mv, pm) = default_matrices();
    run_frame(&node, &mut raster, mv, pm);

    // Exactly one host round trip per frame on the copy-through path.
    assert_eq!(log.count("queue.read_back"), 1);
    assert_eq!(log.count("raster.upload"), 1);

    let events = log.take();
    // Interop is attempted first even on a device that refuses it.
    let interop = events
        .iter()
        .position(|e| e == "platform.create dev0 interop=true")
        .expect("interop attempt");
    let standalone = events
        .iter()
        .position(|e| e == "platform.create dev0 interop=false")
        .expect("standalone attempt");
    assert!(interop < standalone);

    assert!(events.contains(&"context.private 32x32".to_string()));
    assert!(events.contains(&"queue.read_back 32x32".to_string()));
    assert!(events.contains(&"raster.upload 32x32".to_string()));
    // No interop fences on private images.
    assert!(!events.iter().any(|e| e.starts_with("queue.acquire")));
    assert!(!events.iter().any(|e| e.starts_with("queue.release")));
}

#[test]
fn second_frame_reuses_context_and_buffers() {
    let log = EventLog::new();
    let node = node_with_client(MockPlatform::sharing(log.clone()), RecordingClient::unit(log.clone()));
    let mut raster = MockRaster::new(0, 64, 64, log.clone());
    let (mv, pm) = default_matrices();

    run_frame(&node, &mut raster, mv, pm);
    log.take();
    run_frame(&node, &mut raster, mv, pm);

    let events = log.take();
    assert!(!events.iter().any(|e| e.starts_with("platform.")));
    assert!(!events.iter().any(|e| e.starts_with("client.build")));
    assert!(!events.iter().any(|e| e.starts_with("raster.targets")));
    assert!(events.contains(&"client.dispatch 64x64 Perspective".to_string()));
}

#[test]
fn viewport_change_reallocates_and_rebinds() {
    let log = EventLog::new();
    let node = node_with_client(MockPlatform::sharing(log.clone()), RecordingClient::unit(log.clone()));
    let mut raster = MockRaster::new(0, 512, 512, log.clone());
    let (mv, pm) = default_matrices();

    run_frame(&node, &mut raster, mv, pm);
    log.take();

    raster.viewport = Viewport::new(800, 600);
    run_frame(&node, &mut raster, mv, pm);

    let events = log.take();
    assert!(events.contains(&"raster.targets 800x600".to_string()));
    assert!(events.contains(&"context.wrap 800x600".to_string()));
    assert!(events.contains(&"client.bind 800x600 zero_copy=true".to_string()));
    assert!(events.contains(&"client.dispatch 800x600 Perspective".to_string()));
    // The context itself survives the resize.
    assert!(!events.iter().any(|e| e.starts_with("platform.create")));
}

#[test]
fn dispatch_failure_latches_context_until_reset() {
    let log = EventLog::new();
    let platform = MockPlatform::sharing(log.clone());
    let client = RecordingClient::unit(log.clone());
    let node = node_with_client(platform, client.clone());
    let mut raster = MockRaster::new(0, 64, 64, log.clone());
    let (mv, pm) = default_matrices();

    *client.fail_dispatch.lock() = true;
    run_frame(&node, &mut raster, mv, pm);
    assert!(node.is_invalid(RenderContextId(0)));
    log.take();

    // Latched: the scripted failure is gone, but the context stays dead.
    // No enumeration or context creation is retried either.
    *client.fail_dispatch.lock() = false;
    run_frame(&node, &mut raster, mv, pm);
    assert_eq!(log.count("platform."), 0);
    let events = log.take();
    assert!(!events.iter().any(|e| e.starts_with("client.dispatch")));
    assert!(!events.iter().any(|e| e.starts_with("raster.present")));

    // Explicit reset rebuilds from scratch.
    node.reset();
    assert!(!node.is_invalid(RenderContextId(0)));
    run_frame(&node, &mut raster, mv, pm);
    let events = log.take();
    assert!(events.contains(&"platform.create dev0 interop=true".to_string()));
    assert!(events.contains(&"client.dispatch 64x64 Perspective".to_string()));
    assert!(events.contains(&"raster.present 64x64".to_string()));
}

#[test]
fn empty_platform_latches_context() {
    let log = EventLog::new();
    let node = node_with_client(MockPlatform::barren(log.clone()), RecordingClient::unit(log.clone()));
    let mut raster = MockRaster::new(0, 64, 64, log.clone());
    let (mv, pm) = default_matrices();

    run_frame(&node, &mut raster, mv, pm);
    assert!(node.is_invalid(RenderContextId(0)));
}

#[test]
fn contexts_fail_independently() {
    let log = EventLog::new();
    let platform = MockPlatform::sharing(log.clone());
    let client = RecordingClient::unit(log.clone());
    let node = node_with_client(platform, client.clone());
    let (mv, pm) = default_matrices();

    let mut raster_a = MockRaster::new(0, 64, 64, log.clone());
    let mut raster_b = MockRaster::new(1, 64, 64, log.clone());

    *client.fail_dispatch.lock() = true;
    run_frame(&node, &mut raster_a, mv, pm);
    *client.fail_dispatch.lock() = false;
    run_frame(&node, &mut raster_b, mv, pm);

    assert!(node.is_invalid(RenderContextId(0)));
    assert!(!node.is_invalid(RenderContextId(1)));

    // Per-context reset revives only the latched context.
    node.reset_context(RenderContextId(0));
    assert!(!node.is_invalid(RenderContextId(0)));
    log.take();
    run_frame(&node, &mut raster_a, mv, pm);
    assert!(log
        .take()
        .contains(&"client.dispatch 64x64 Perspective".to_string()));
}

#[test]
fn inactive_node_skips_registration() {
    let log = EventLog::new();
    let node = node_with_client(MockPlatform::sharing(log.clone()), RecordingClient::unit(log.clone()));
    let mut raster = MockRaster::new(0, 64, 64, log.clone());
    let (mv, pm) = default_matrices();

    node.deactivate();
    run_frame(&node, &mut raster, mv, pm);
    assert_eq!(log.take().len(), 0);

    node.activate();
    run_frame(&node, &mut raster, mv, pm);
    assert!(log.take().iter().any(|e| e.starts_with("client.dispatch")));
}

#[test]
fn bound_outside_frustum_skips_registration() {
    let log = EventLog::new();
    // Bound well behind the camera.
    let client = RecordingClient::new(
        Aabb::new(Vec3::new(-1.0, -1.0, 40.0), Vec3::new(1.0, 1.0, 42.0)),
        log.clone(),
    );
    let node = node_with_client(MockPlatform::sharing(log.clone()), client);
    let mut raster = MockRaster::new(0, 64, 64, log.clone());
    let (mv, pm) = default_matrices();

    run_frame(&node, &mut raster, mv, pm);
    assert_eq!(log.take().len(), 0);
    assert_eq!(node.gate().in_flight(), 0);
}

#[test]
fn node_without_client_is_invisible() {
    let log = EventLog::new();
    let node = BridgeNode::new(MockPlatform::sharing(log.clone()));
    let mut raster = MockRaster::new(0, 64, 64, log.clone());
    let (mv, pm) = default_matrices();

    run_frame(&node, &mut raster, mv, pm);
    assert_eq!(log.take().len(), 0);
}

#[test]
fn attaching_a_client_steals_it_from_its_owner() {
    let log = EventLog::new();
    let platform = MockPlatform::sharing(log.clone());
    let slot = ClientSlot::new(RecordingClient::unit(log.clone()));

    let first = BridgeNode::new(platform.clone());
    let second = BridgeNode::new(platform);

    first.attach_client(&slot);
    assert!(Arc::ptr_eq(&slot.owner().unwrap(), &first));
    assert!(first.client().is_some());

    second.attach_client(&slot);
    assert!(Arc::ptr_eq(&slot.owner().unwrap(), &second));
    assert!(first.client().is_none());
    assert!(second.client().is_some());
}

#[test]
fn detach_clears_owner_and_state() {
    let log = EventLog::new();
    let slot = ClientSlot::new(RecordingClient::unit(log.clone()));
    let node = BridgeNode::new(MockPlatform::sharing(log.clone()));
    node.attach_client(&slot);
    node.detach_client();
    assert!(slot.owner().is_none());
    assert!(node.client().is_none());
}

#[test]
fn dynamic_node_completes_the_frame_handshake() {
    let log = EventLog::new();
    let node = BridgeNode::with_options(
        MockPlatform::sharing(log.clone()),
        DataVariance::Dynamic,
        true,
    );
    node.attach_client(&ClientSlot::new(RecordingClient::unit(log.clone())));
    let mut raster = MockRaster::new(0, 64, 64, log.clone());
    let (mv, pm) = default_matrices();

    let remaining = run_frame(&node, &mut raster, mv, pm);
    assert_eq!(remaining, 0);
    assert_eq!(node.gate().in_flight(), 0);

    // With nothing in flight, deactivation never blocks.
    node.deactivate();
    node.activate();
}

#[test]
fn deactivated_at_construction_until_first_activate() {
    let log = EventLog::new();
    let node = BridgeNode::with_options(
        MockPlatform::sharing(log.clone()),
        DataVariance::Static,
        false,
    );
    node.attach_client(&ClientSlot::new(RecordingClient::unit(log.clone())));
    let mut raster = MockRaster::new(0, 64, 64, log.clone());
    let (mv, pm) = default_matrices();

    run_frame(&node, &mut raster, mv, pm);
    assert_eq!(log.take().len(), 0);

    node.activate();
    run_frame(&node, &mut raster, mv, pm);
    assert!(log.take().iter().any(|e| e.starts_with("raster.present")));
}
