//! Small demo host for `calltap serve`.
//!
//! Defines a handful of game-flavoured methods on a [`Trampoline`] and calls
//! them on a background thread, so an observer connecting to the control
//! channel has something to watch and intercept.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use calltap::{ArgValue, Invocation, LifecycleProbe, MethodDescriptor, Trampoline};

const TICK: Duration = Duration::from_secs(1);

/// Build the demo method table.
pub fn host() -> Arc<Trampoline> {
    let host = Trampoline::new();
    host.define(MethodDescriptor::new("demo.Player", "TakeDamage"));
    host.define(MethodDescriptor::new("demo.Player", "Rename"));
    host.define(MethodDescriptor::new("demo.Inventory", "AddItem"));
    // Filtered by the default ignored namespaces.
    host.define(MethodDescriptor::new("std.thread", "sleep"));
    Arc::new(host)
}

/// Reports a fake collision for collision callbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoProbe;

impl LifecycleProbe for DemoProbe {
    fn sample(&self, callback: &str) -> Option<String> {
        match callback {
            "OnCollisionEnter" | "OnCollisionExit" => Some("Collision(Wall)".to_string()),
            "OnTriggerEnter" | "OnTriggerExit" => Some("Collider(Pickup)".to_string()),
            _ => None,
        }
    }
}

/// Call the demo methods once per second until `shutdown` is set.
pub fn spawn_driver(host: Arc<Trampoline>, shutdown: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("calltap-demo".to_string())
        .spawn(move || {
            let mut health: i64 = 100;
            let mut round: u64 = 0;
            while !shutdown.load(Ordering::Relaxed) {
                round += 1;
                health = take_damage(&host, health, 7);
                if round % 3 == 0 {
                    rename(&host, &format!("hero-{round}"));
                }
                add_item(&host, "potion", 1);
                if health <= 0 {
                    health = 100;
                }
                std::thread::sleep(TICK);
            }
        })
        .context("Failed to spawn demo driver thread")
}

fn take_damage(host: &Trampoline, health: i64, amount: i64) -> i64 {
    let outcome = host.invoke(
        "demo.Player.TakeDamage",
        Some("Player"),
        vec![ArgValue::Int(health), ArgValue::Int(amount)],
        |args| match (&args[0], &args[1]) {
            (ArgValue::Int(health), ArgValue::Int(amount)) => Some(ArgValue::Int(health - amount)),
            _ => None,
        },
    );
    match outcome {
        Invocation::Completed {
            result: Some(ArgValue::Int(remaining)),
            ..
        } => remaining,
        Invocation::Completed { .. } => health,
        Invocation::Vetoed => {
            log::info!("[Demo] TakeDamage vetoed, health stays {health}");
            health
        }
    }
}

fn rename(host: &Trampoline, name: &str) {
    let outcome = host.invoke("demo.Player.Rename", Some("Player"), vec![ArgValue::from(name)], |args| {
        log::debug!("[Demo] Player renamed to {}", args[0]);
        None
    });
    if outcome == Invocation::Vetoed {
        log::info!("[Demo] Rename vetoed");
    }
}

fn add_item(host: &Trampoline, item: &str, count: i64) {
    host.invoke(
        "demo.Inventory.AddItem",
        None,
        vec![ArgValue::from(item), ArgValue::Int(count)],
        |args| Some(ArgValue::Bool(matches!(args[1], ArgValue::Int(n) if n > 0))),
    );
}
