use std::env;
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

use backpack_volume_bot::runner::init_logging;
use backpack_volume_bot::{stdin_lines, BotRunner, Credentials, Settings, SharedLines, VolumeParams};
use log::{error, info};
use tokio::io::{AsyncBufRead, BufReader, Stdin};

type Lines = SharedLines<BufReader<Stdin>>;

const STATUS_REFRESH: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = dotenvy::dotenv();

    // Parse arguments
    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 2 && args[1] == "--config" {
        args[2].clone()
    } else {
        "config.toml".to_string()
    };

    let settings = Settings::new(&config_path)?;
    init_logging(&settings.log);

    match dotenv {
        Ok(path) => info!("Loaded environment from: {}", path.display()),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let runner = BotRunner::from_settings(settings, &Credentials::from_env());

    let lines = stdin_lines();
    let mut params = runner.default_params();

    loop {
        print_menu(&runner, &params);
        let Some(choice) = prompt(&lines, "Select: ").await else {
            break;
        };

        match choice.trim() {
            "1" => status_view(&runner, &params.symbol, &lines).await,
            "2" => {
                if let Err(e) = runner.run_volume(&params, lines.clone()).await {
                    error!("Volume run failed: {e}");
                }
            }
            "3" => {
                let report = runner.close_all_positions(&params.symbol).await;
                if !report.orders_cancelled {
                    println!("Cancelling open orders failed, see log");
                }
                let failed = report.orders.iter().filter(|o| !o.succeeded).count();
                println!(
                    "Close orders sent: {}, failed: {failed}",
                    report.orders.len()
                );
            }
            "4" => {
                if !edit_params(&lines, &mut params).await {
                    break;
                }
            }
            "5" => {
                println!("Bye.");
                break;
            }
            _ => println!("Pick a number from the menu."),
        }
    }

    Ok(())
}

fn print_menu(runner: &BotRunner, params: &VolumeParams) {
    let cycles = if params.is_unbounded() {
        "unbounded".to_string()
    } else {
        params.cycles.to_string()
    };
    let mode = if runner.is_simulated() { "SIMULATED" } else { "LIVE" };

    println!("\n===== Backpack volume bot =====");
    println!(
        "Params: symbol={} size={} orders/side={} cycles={} delay={}~{}s",
        params.symbol,
        params.size,
        params.order_count,
        cycles,
        params.interval_min,
        params.interval_max
    );
    println!("Mode: {mode}");
    println!("1) Balances / positions");
    println!("2) Run volume with current params");
    println!("3) Close all positions");
    println!("4) Edit params");
    println!("5) Quit");
}

/// Print `text` and read one line. None on end of input.
async fn prompt<R>(lines: &SharedLines<R>, text: &str) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    print!("{text}");
    let _ = std::io::stdout().flush();
    match lines.lock().await.next_line().await {
        Ok(line) => line,
        Err(e) => {
            error!("Failed to read input: {e}");
            None
        }
    }
}

/// Redraw the account snapshot every second until Enter
async fn status_view(runner: &BotRunner, symbol: &str, lines: &Lines) {
    let enter = async { lines.lock().await.next_line().await };
    tokio::pin!(enter);

    loop {
        let refresh = async {
            let snapshot = runner.status(symbol).await;
            print!("\x1b[2J\x1b[H");
            println!("[Live status] (press Enter to return)\n");
            print!("{snapshot}");
            let _ = std::io::stdout().flush();
            tokio::time::sleep(STATUS_REFRESH).await;
        };

        tokio::select! {
            _ = &mut enter => break,
            _ = refresh => {}
        }
    }
}

/// Interactive parameter editing. Returns false on end of input.
async fn edit_params<R>(lines: &SharedLines<R>, params: &mut VolumeParams) -> bool
where
    R: AsyncBufRead + Unpin,
{
    let Some(symbol) = prompt(lines, "Symbol (e.g. SOL): ").await else {
        return false;
    };
    let Some(size) = prompt(lines, "Order size: ").await else {
        return false;
    };
    let Some(order_count) = prompt(lines, "Orders per side: ").await else {
        return false;
    };
    let Some(cycles) = prompt(lines, "Cycles (0 = until stopped): ").await else {
        return false;
    };
    let Some(interval_min) = prompt(lines, "Min delay (s): ").await else {
        return false;
    };
    let Some(interval_max) = prompt(lines, "Max delay (s): ").await else {
        return false;
    };

    let edits = ParamEdits {
        symbol,
        size,
        order_count,
        cycles,
        interval_min,
        interval_max,
    };
    for note in edits.apply(params) {
        println!("{note}");
    }
    true
}

/// Raw answers to the edit prompts
struct ParamEdits {
    symbol: String,
    size: String,
    order_count: String,
    cycles: String,
    interval_min: String,
    interval_max: String,
}

impl ParamEdits {
    /// Apply the answers, keeping the old value for anything unusable.
    /// Returns a note for each rejected answer.
    fn apply(&self, params: &mut VolumeParams) -> Vec<String> {
        let mut notes = Vec::new();

        let symbol = self.symbol.trim();
        if !symbol.is_empty() {
            params.symbol = symbol.to_uppercase();
        }

        let size = parse_or_keep(&self.size, params.size, &mut notes);
        if size > 0.0 {
            params.size = size;
        } else {
            notes.push("Order size must be positive, keeping the old value".into());
        }

        let order_count = parse_or_keep(&self.order_count, params.order_count, &mut notes);
        if order_count >= 1 {
            params.order_count = order_count;
        } else {
            notes.push("Orders per side must be at least 1, keeping the old value".into());
        }

        // Negative or fractional counts fail to parse
        params.cycles = parse_or_keep(&self.cycles, params.cycles, &mut notes);

        let min = parse_or_keep(&self.interval_min, params.interval_min, &mut notes);
        let max = parse_or_keep(&self.interval_max, params.interval_max, &mut notes);
        if min >= 0.0 && max >= 0.0 && min <= max {
            params.interval_min = min;
            params.interval_max = max;
        } else {
            notes.push("Delays must be >= 0 with min <= max, keeping the old values".into());
        }

        notes
    }
}

fn parse_or_keep<T: FromStr + Copy>(input: &str, old: T, notes: &mut Vec<String>) -> T {
    let input = input.trim();
    if input.is_empty() {
        return old;
    }
    match input.parse() {
        Ok(value) => value,
        Err(_) => {
            notes.push(format!("Could not parse '{input}', keeping the old value"));
            old
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edits(values: [&str; 6]) -> ParamEdits {
        ParamEdits {
            symbol: values[0].into(),
            size: values[1].into(),
            order_count: values[2].into(),
            cycles: values[3].into(),
            interval_min: values[4].into(),
            interval_max: values[5].into(),
        }
    }

    #[test]
    fn test_apply_valid_edits() {
        let mut params = VolumeParams::default();
        let notes = edits(["btc", "0.5", "3", "0", "0.2", "0.4"]).apply(&mut params);

        assert!(notes.is_empty());
        assert_eq!(params.symbol, "BTC");
        assert_eq!(params.size, 0.5);
        assert_eq!(params.order_count, 3);
        assert!(params.is_unbounded());
        assert_eq!((params.interval_min, params.interval_max), (0.2, 0.4));
    }

    #[test]
    fn test_rejected_edits_keep_old_values() {
        let mut params = VolumeParams::default();
        let notes = edits(["", "abc", "0", "-1", "5", "2"]).apply(&mut params);

        assert_eq!(params, VolumeParams::default());
        assert_eq!(notes.len(), 4);
    }

    #[test]
    fn test_blank_answers_keep_values() {
        let mut params = VolumeParams::default();
        let notes = edits(["", "", "", "", "", ""]).apply(&mut params);
        assert!(notes.is_empty());
        assert_eq!(params, VolumeParams::default());
    }

    #[test]
    fn test_counts_must_be_whole_numbers() {
        let mut params = VolumeParams::default();
        let notes = edits(["", "", "2.5", "1e12", "", ""]).apply(&mut params);
        assert_eq!(params.order_count, 1);
        assert_eq!(params.cycles, 1);
        assert_eq!(notes.len(), 2);

        let notes = edits(["", "", "7", "99999999999", "", ""]).apply(&mut params);
        assert_eq!(params.order_count, 7);
        assert_eq!(params.cycles, 1);
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn test_edit_params_from_input() {
        let input: &[u8] = b"eth\n0.1\n2\n5\n0\n1\n";
        let lines = backpack_volume_bot::shared_lines(input);
        let mut params = VolumeParams::default();

        assert!(edit_params(&lines, &mut params).await);
        assert_eq!(params.symbol, "ETH");
        assert_eq!(params.order_count, 2);
        assert_eq!(params.cycles, 5);

        assert!(!edit_params(&lines, &mut params).await);
    }
}
