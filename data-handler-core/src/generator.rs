//! Synthetic user/order batches for the producer.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah",
    "Charles", "Karen", "Daniel", "Nancy", "Matthew", "Lisa", "Anthony", "Betty",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor",
    "Moore", "Jackson", "Martin", "Lee", "Perez", "Thompson", "White", "Harris", "Clark",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

const PRODUCTS: &[&str] = &[
    "lamp", "chair", "notebook", "kettle", "backpack", "monitor", "keyboard", "umbrella",
    "blender", "headphones", "candle", "mirror", "pillow", "wallet", "thermos", "toaster",
    "scarf", "stapler", "teapot", "speaker",
];

/// User row to insert; the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

/// Order row to insert under the user of the same batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub product_name: String,
    pub quantity: i32,
}

/// One user and the orders that reference it, written in a single transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBatch {
    pub user: NewUser,
    pub orders: Vec<NewOrder>,
}

impl UserBatch {
    /// Number of rows this batch inserts
    pub fn row_count(&self) -> u64 {
        1 + self.orders.len() as u64
    }
}

/// Produces random but well-formed batches
pub struct RecordGenerator<R = StdRng> {
    rng: R,
    sequence: u64,
}

impl RecordGenerator<StdRng> {
    /// Generator seeded from the operating system
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    /// Generator with a fixed seed
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RecordGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng, sequence: 0 }
    }

    /// Generate one user with 1 or 2 orders, each with a quantity in `[1, 10]`
    pub fn next_batch(&mut self) -> UserBatch {
        self.sequence += 1;

        let first = self.pick(FIRST_NAMES);
        let last = self.pick(LAST_NAMES);
        let domain = self.pick(EMAIL_DOMAINS);
        let user = NewUser {
            name: format!("{} {}", first, last),
            // sequence keeps emails distinct within a run
            email: format!(
                "{}.{}{}@{}",
                first.to_lowercase(),
                last.to_lowercase(),
                self.sequence,
                domain
            ),
        };

        let order_count = self.rng.random_range(1..=2);
        let orders = (0..order_count)
            .map(|_| NewOrder {
                product_name: self.pick(PRODUCTS).to_string(),
                quantity: self.rng.random_range(1..=10),
            })
            .collect();

        UserBatch { user, orders }
    }

    fn pick(&mut self, items: &[&'static str]) -> &'static str {
        items[self.rng.random_range(0..items.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_are_well_formed() {
        let mut generator = RecordGenerator::seeded(7);
        for _ in 0..500 {
            let batch = generator.next_batch();
            assert!((1..=2).contains(&batch.orders.len()));
            assert!(batch.row_count() == 2 || batch.row_count() == 3);
            assert!(batch.user.name.contains(' '));
            assert!(batch.user.email.contains('@'));
            for order in &batch.orders {
                assert!((1..=10).contains(&order.quantity));
                assert!(!order.product_name.is_empty());
            }
        }
    }

    #[test]
    fn test_both_order_counts_occur() {
        let mut generator = RecordGenerator::seeded(42);
        let counts: Vec<usize> = (0..100).map(|_| generator.next_batch().orders.len()).collect();
        assert!(counts.contains(&1));
        assert!(counts.contains(&2));
    }

    #[test]
    fn test_same_seed_same_batches() {
        let mut a = RecordGenerator::seeded(1);
        let mut b = RecordGenerator::seeded(1);
        for _ in 0..10 {
            assert_eq!(a.next_batch(), b.next_batch());
        }
    }

    #[test]
    fn test_emails_distinct_within_run() {
        let mut generator = RecordGenerator::seeded(3);
        let mut emails: Vec<String> = (0..200).map(|_| generator.next_batch().user.email).collect();
        emails.sort();
        emails.dedup();
        assert_eq!(emails.len(), 200);
    }
}
