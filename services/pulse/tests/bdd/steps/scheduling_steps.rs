//! BDD step definitions for scheduling

use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when};
use tokio_util::sync::CancellationToken;

use pulse::config::EndpointConfig;
use pulse::delivery::Dispatcher;
use pulse::engine::Engine;
use pulse::probe::Prober;
use pulse::state::new_state_handle;

use crate::doubles::{run_paused, Behaviour};
use crate::world::PulseWorld;

fn update_behaviour(world: &mut PulseWorld, name: &str, f: impl FnOnce(&mut Behaviour)) {
    let mut behaviour = world.behaviours.remove(name).unwrap_or_default();
    f(&mut behaviour);
    world.prober.set(name, behaviour.clone());
    world.behaviours.insert(name.to_string(), behaviour);
}

#[given(expr = "a scheduled endpoint {string} probed every {int} seconds")]
fn scheduled_endpoint(world: &mut PulseWorld, name: String, seconds: u64) {
    let mut endpoint = EndpointConfig::new(&name, format!("https://{}.example.com", name));
    endpoint.interval_seconds = seconds;
    world.endpoints.push(endpoint);
}

#[given(expr = "probes of {string} take {int} seconds")]
fn probes_take(world: &mut PulseWorld, name: String, seconds: u64) {
    update_behaviour(world, &name, |b| b.delay = Duration::from_secs(seconds));
}

#[given(expr = "probes of {string} always fail")]
fn probes_always_fail(world: &mut PulseWorld, name: String) {
    update_behaviour(world, &name, |b| b.outcomes = vec![false]);
}

#[given(expr = "a shutdown grace of {int} seconds")]
fn shutdown_grace(world: &mut PulseWorld, seconds: u64) {
    world.grace = Some(Duration::from_secs(seconds));
}

#[when(expr = "the scheduler runs for {int} seconds")]
fn scheduler_runs(world: &mut PulseWorld, seconds: u64) {
    let endpoints = world.endpoints.clone();
    let prober = Arc::clone(&world.prober) as Arc<dyn Prober>;
    let grace = world.grace.unwrap_or(Duration::from_secs(5));
    let state = new_state_handle(&endpoints, 10);
    world.state = Some(Arc::clone(&state));

    let elapsed = run_paused(move || async move {
        let cancel = CancellationToken::new();
        let engine = Engine::new(
            endpoints,
            prober,
            Dispatcher::new(256),
            state,
            cancel.clone(),
            grace,
        );
        let run = tokio::spawn(async move { engine.run().await });

        tokio::time::sleep(Duration::from_secs(seconds)).await;
        let stopping = tokio::time::Instant::now();
        cancel.cancel();
        run.await.expect("engine panicked");
        stopping.elapsed()
    });
    world.elapsed_after_stop = Some(elapsed);
}

#[then(expr = "{string} was probed {int} times")]
fn was_probed(world: &mut PulseWorld, name: String, times: u32) {
    assert_eq!(world.prober.calls(&name), times, "probe count for '{}'", name);
}

#[then(expr = "{string} skipped {int} ticks")]
async fn skipped_ticks(world: &mut PulseWorld, name: String, ticks: u64) {
    let state = world.state.as_ref().expect("scheduler has not run");
    let state = state.read().await;
    let status = state.get_endpoint(&name).expect("unknown endpoint");
    assert_eq!(status.skipped_ticks, ticks);
}

#[then(expr = "{string} is {string} with {int} consecutive successes")]
async fn endpoint_is(world: &mut PulseWorld, name: String, status: String, successes: u32) {
    let state = world.state.as_ref().expect("scheduler has not run");
    let state = state.read().await;
    let endpoint = state.get_endpoint(&name).expect("unknown endpoint");
    assert_eq!(endpoint.status.to_string(), status);
    assert_eq!(endpoint.consecutive_successes, successes);
}

#[then(expr = "the scheduler stopped within {int} seconds")]
fn stopped_within(world: &mut PulseWorld, seconds: u64) {
    let elapsed = world.elapsed_after_stop.expect("scheduler has not run");
    assert!(
        elapsed <= Duration::from_secs(seconds),
        "stopping took {:?}",
        elapsed
    );
}
