//! Fuzz target for two-party ratchet delivery
//!
//! Drives a pair of messengers through arbitrary send, delivery, replay and
//! tamper sequences over an adversarial network.
//!
//! # Strategy
//!
//! - Either side sends at any time (including simultaneous first contact)
//! - Queued envelopes are delivered in arbitrary order, dropped or repeated
//! - Ciphertext and header fields are corrupted before delivery
//!
//! # Invariants
//!
//! - No operation panics
//! - A successful decrypt always yields exactly what was sent
//! - An envelope that decrypted once is a replay forever after
//! - A tampered envelope never decrypts

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tessera_core::{Envelope, Messenger, MessengerConfig, MessengerError, SeededEnv};
use tessera_crypto::{AuthoritySigner, KeyPair};

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    operations: Vec<Operation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Operation {
    Send { from_alice: bool, text: String },
    Deliver { to_alice: bool, index: u8 },
    Replay { to_alice: bool, index: u8 },
    TamperCiphertext { to_alice: bool, index: u8, position: u16, mask: u8 },
    TamperCounter { to_alice: bool, index: u8, delta: u8 },
}

struct InFlight {
    envelope: Envelope,
    text: String,
    delivered: bool,
}

fuzz_target!(|scenario: Scenario| {
    let mut config = MessengerConfig::new(
        AuthoritySigner::from_secret_bytes(&[1u8; 32]).authority_key(),
        *KeyPair::from_secret_bytes([2u8; 32]).public(),
    );
    config.self_heal = false;

    let env = SeededEnv::new(scenario.seed);
    let mut alice = Messenger::new(env.clone(), config.clone());
    let mut bob = Messenger::new(env, config);
    let alice_cert = alice.generate_certificate("alice").expect("alice certificate");
    let bob_cert = bob.generate_certificate("bob").expect("bob certificate");
    alice.receive_certificate(bob_cert, None).expect("accept bob");
    bob.receive_certificate(alice_cert, None).expect("accept alice");

    // Index 0: towards Bob, index 1: towards Alice
    let mut queues: [Vec<InFlight>; 2] = [Vec::new(), Vec::new()];

    for op in scenario.operations.into_iter().take(64) {
        match op {
            Operation::Send { from_alice, text } => {
                let (sender, recipient, queue) = if from_alice {
                    (&mut alice, "bob", 0)
                } else {
                    (&mut bob, "alice", 1)
                };
                let envelope = sender.send_message(recipient, &text).expect("send never fails");
                queues[queue].push(InFlight { envelope, text, delivered: false });
            },

            Operation::Deliver { to_alice, index } => {
                let (receiver, sender, queue) = endpoints(&mut alice, &mut bob, to_alice);
                let Some(item) = pick(&mut queues[queue], index) else { continue };

                match receiver.receive_message(sender, &item.envelope) {
                    Ok(plaintext) => {
                        assert_eq!(plaintext, item.text, "decrypt must return the sent text");
                        assert!(!item.delivered, "a delivered envelope must not decrypt twice");
                        item.delivered = true;
                    },
                    Err(MessengerError::Replay { .. }) => {
                        assert!(item.delivered, "only delivered envelopes are replays");
                    },
                    Err(_) => {},
                }
            },

            Operation::Replay { to_alice, index } => {
                let (receiver, sender, queue) = endpoints(&mut alice, &mut bob, to_alice);
                let Some(item) = pick(&mut queues[queue], index) else { continue };
                if !item.delivered {
                    continue;
                }
                let result = receiver.receive_message(sender, &item.envelope);
                assert!(
                    matches!(result, Err(MessengerError::Replay { .. })),
                    "delivered envelope must be rejected as replay"
                );
            },

            Operation::TamperCiphertext { to_alice, index, position, mask } => {
                if mask == 0 {
                    continue;
                }
                let (receiver, sender, queue) = endpoints(&mut alice, &mut bob, to_alice);
                let Some(item) = pick(&mut queues[queue], index) else { continue };
                let mut forged = item.envelope.clone();
                if forged.ciphertext.is_empty() {
                    continue;
                }
                let position = position as usize % forged.ciphertext.len();
                forged.ciphertext[position] ^= mask;

                assert!(
                    receiver.receive_message(sender, &forged).is_err(),
                    "tampered ciphertext must not decrypt"
                );
            },

            Operation::TamperCounter { to_alice, index, delta } => {
                if delta == 0 {
                    continue;
                }
                let (receiver, sender, queue) = endpoints(&mut alice, &mut bob, to_alice);
                let Some(item) = pick(&mut queues[queue], index) else { continue };
                let mut forged = item.envelope.clone();
                forged.header.message_number =
                    forged.header.message_number.wrapping_add(u32::from(delta));

                assert!(
                    receiver.receive_message(sender, &forged).is_err(),
                    "header is bound as associated data"
                );
            },
        }
    }
});

fn endpoints<'a>(
    alice: &'a mut Messenger<SeededEnv>,
    bob: &'a mut Messenger<SeededEnv>,
    to_alice: bool,
) -> (&'a mut Messenger<SeededEnv>, &'static str, usize) {
    if to_alice { (alice, "bob", 1) } else { (bob, "alice", 0) }
}

fn pick(queue: &mut [InFlight], index: u8) -> Option<&mut InFlight> {
    if queue.is_empty() {
        return None;
    }
    let len = queue.len();
    queue.get_mut(index as usize % len)
}
