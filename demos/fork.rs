use std::time::Duration;

use fittings::{zip_each, Liquid, Options, Producer, StageError};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), fittings::FlowError> {
    tracing_subscriber::fmt::init();

    let mut tick = 0;
    let readings = Producer::start_with(Options::default().buffer_size_max(4).debug(true), move || {
        tick += 1;
        let n = tick;
        async move {
            match n {
                n if n > 12 => Ok(Liquid::End),
                n if n % 5 == 0 => Err(StageError::msg(format!("sensor timeout at tick {n}"))),
                n => Ok(Liquid::Value(n * 3 % 7)),
            }
        }
    })?;

    // both branches must be registered before the runtime gets a chance to run the source
    let fast = readings.fork()?.errors(|e| async move {
        tracing::warn!(error = %e, "dropping failed reading");
        Liquid::Nil
    })?;
    let slow = readings
        .fork()?
        .errors(|_e| async { Liquid::Value(-1) })?
        .map(|x| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            x * 100
        })?;

    let (rows, _lanes) = zip_each(&[fast, slow])?;

    let sink = rows
        .sink_fn(|liquid: Liquid<Vec<Liquid<i32>>>| async move {
            if let Liquid::Value(row) = liquid {
                let row = row
                    .iter()
                    .map(|lane| match lane {
                        Liquid::Value(x) => x.to_string(),
                        _ => "-".to_string(),
                    })
                    .collect::<Vec<_>>();
                println!("{}", row.join("\t"));
            }
        })
        .done(|| println!("done"))
        .spawn()?;

    sink.await?;
    Ok(())
}
