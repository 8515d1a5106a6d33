use std::sync::{Condvar, Mutex};

/// A counting semaphore bounding how many peer sockets may be outstanding at
/// once. No crate in the dependency stack offers a blocking (non-async)
/// counting semaphore, so this is hand-rolled from `Mutex`+`Condvar` —
/// the same primitives the rest of this module already uses for
/// `addrs_cv`/`client_cmd_queues_cv`.
pub struct Semaphore {
    count: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self { count: Mutex::new(permits), cv: Condvar::new() }
    }

    pub fn acquire(&self) {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        while *count == 0 {
            count = self.cv.wait(count).expect("semaphore mutex poisoned");
        }
        *count -= 1;
    }

    pub fn release(&self) {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        *count += 1;
        self.cv.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn blocks_past_capacity_until_released() {
        let sem = Arc::new(Semaphore::new(1));
        sem.acquire();

        let sem2 = Arc::clone(&sem);
        let handle = thread::spawn(move || {
            sem2.acquire();
        });

        thread::sleep(std::time::Duration::from_millis(50));
        sem.release();
        handle.join().unwrap();
    }
}
