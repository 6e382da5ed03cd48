use std::time::Duration;

use crate::Producer;

/// Let the spawned stages run until the producer length settles, then report it
pub async fn wait_for_len<T>(producer: &Producer<T>) -> usize {
    let mut len = producer.len();
    let mut unchanged = 0;

    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(2)).await;

        let current = producer.len();
        if current == len {
            unchanged += 1;
            if unchanged == 5 {
                break;
            }
        } else {
            len = current;
            unchanged = 0;
        }
    }

    len
}
