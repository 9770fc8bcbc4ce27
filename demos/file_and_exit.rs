use std::time::Duration;

use rlog::{ColorRule, LogProgressBar, Value, logger_config};

#[tokio::main]
async fn main() {
    logger_config()
        .with_log_file("/tmp/rlog_demo.log")
        .with_timezone("Asia/Shanghai")
        .with_blocked_words(["hunter2", r"\d{16}"])
        .with_color_rules(
            rlog::default_color_rules()
                .into_iter()
                .chain([ColorRule::new("demo", "magenta")]),
        )
        .run(|logger| async move {
            logger.on_exit(|| println!("callback: cleanup done"));
            logger.info("starting the demo");
            logger.info(Value::mapping([("user", Value::from("alice")), ("admin", Value::from(true))]));
            logger.warning("password hunter2 and card 4111111111111111 are masked");
            logger.log("upload done");

            let bar = LogProgressBar::new(&logger, 50).with_min_timestep_ms(20.0);
            for _ in 0..50 {
                bar.inc(1);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            bar.finish();

            let result: anyhow::Result<()> = Err(logger.exit("demo finished").into());
            result
        })
        .await
        .terminate()
}
