//! Random display names for players who did not pick one

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "Funny", "Silly", "Flying", "Furious", "Dancing", "Magic", "Sleepy", "Fluffy", "Crazy",
    "Explosive", "Lazy", "Noisy", "Slippery",
];

const NOUNS: &[&str] = &[
    "Cat", "Dog", "Dragon", "Knight", "Zombie", "Granny", "Cosmonaut", "Beaver", "Ninja", "Cook",
    "Troll", "Gnome", "Rabbit",
];

const SUFFIXES: &[&str] = &["123", "XYZ", "XD", "LOL", "!!!", "42", "007", "3000"];

/// `AdjectiveNoun`, with a suffix half of the time
pub fn generate_nick() -> String {
    generate_nick_with(&mut rand::thread_rng())
}

pub fn generate_nick_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Brave");
    let noun = NOUNS.choose(rng).copied().unwrap_or("Pilot");
    let suffix = if rng.gen_bool(0.5) {
        SUFFIXES.choose(rng).copied().unwrap_or_default()
    } else {
        ""
    };

    format!("{adjective}{noun}{suffix}")
}
