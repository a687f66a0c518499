//! Indicator math over a window ordered most-recent-first (`data[0]` is the
//! newest point).
//!
//! The EMA seeds from the newest point and walks towards older ones, the
//! MACD takes both averages over the same 26 points, and the RSI is a plain
//! gain/loss ratio without smoothing. These match the values the service has
//! always published; changing any of them changes every stored score.

use crate::Candle;
use statrs::statistics::Statistics;

const MACD_WINDOW: usize = 35;
const MACD_EMA_INPUT: usize = 26;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

pub const STRATEGY_REDUCE_EXPOSURE: &str = "Freeze buys, exit alts if weak";
pub const STRATEGY_AGGRESSIVE_ENTRY: &str = "Aggressive alt entry (momentum play)";
pub const STRATEGY_HIGH_BETA: &str = "Buy high-beta altcoins (e.g., SOL, AVAX)";
pub const STRATEGY_AVOID_ENTRIES: &str = "Avoid all new entries (RSI < 30)";
pub const STRATEGY_TRADING_WINDOW: &str = "Enable alt trading window (MACD crossover)";
pub const STRATEGY_NO_SIGNAL: &str = "No strong BTC signal — rely on altcoin-specific momentum";

/// Percentage change from the oldest to the newest point. Zero when there
/// are fewer than two points or the oldest price is zero.
pub fn momentum(data: &[Candle]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }

    let latest = data[0].last;
    let oldest = data[data.len() - 1].last;
    if oldest == 0.0 {
        return 0.0;
    }

    (latest - oldest) / oldest * 100.0
}

/// Population standard deviation of the last price.
pub fn volatility(data: &[Candle]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|c| c.last).population_std_dev()
}

pub fn average_spread(data: &[Candle]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    data.iter()
        .map(|c| {
            if c.bid == 0.0 {
                0.0
            } else {
                (c.ask - c.bid) / c.bid * 100.0
            }
        })
        .mean()
}

pub fn ema(data: &[Candle], period: usize) -> f64 {
    ema_of(data.iter().map(|c| c.last), period)
}

fn ema_of<I>(values: I, period: usize) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let k = 2.0 / (period as f64 + 1.0);
    let mut values = values.into_iter();

    let Some(seed) = values.next() else {
        return 0.0;
    };
    values.fold(seed, |ema, value| value * k + ema * (1.0 - k))
}

/// Returns `(macd, signal)`.
pub fn macd(data: &[Candle]) -> (f64, f64) {
    let slice = &data[..data.len().min(MACD_WINDOW)];
    let input = &slice[..slice.len().min(MACD_EMA_INPUT)];

    let fast = ema(input, MACD_FAST);
    let slow = ema(input, MACD_SLOW);
    let macd = fast - slow;

    let signal = ema_of(std::iter::repeat(macd).take(slice.len()), MACD_SIGNAL);

    (macd, signal)
}

pub fn rsi(data: &[Candle], period: usize) -> f64 {
    let mut gains = 0.0;
    let mut losses = 0.0;

    for i in (1..=period).take_while(|&i| i < data.len()) {
        // data[i - 1] is the newer point, so a rise lands in `losses`.
        let diff = data[i - 1].last - data[i].last;
        if diff > 0.0 {
            losses += diff;
        } else {
            gains -= diff;
        }
    }

    let rs = gains / if losses != 0.0 { losses } else { 1.0 };
    100.0 - 100.0 / (1.0 + rs)
}

/// Composite 0-100 score weighting momentum 50%, volatility 30% and spread 20%.
pub fn strength_score(momentum: f64, volatility: f64, spread: f64) -> f64 {
    let m = (momentum * 5.0).clamp(0.0, 100.0);
    let v = (100.0 - volatility).clamp(0.0, 100.0);
    let s = (100.0 - spread * 10.0).clamp(0.0, 100.0);
    m * 0.5 + v * 0.3 + s * 0.2
}

pub fn derive_strategy(strength: f64, momentum: f64, rsi: f64, macd: f64, signal: f64) -> Vec<String> {
    let mut strategy = Vec::new();

    if strength < 30.0 {
        strategy.push(STRATEGY_REDUCE_EXPOSURE.to_string());
    }
    if strength > 70.0 {
        strategy.push(STRATEGY_AGGRESSIVE_ENTRY.to_string());
    }
    if momentum > 0.5 {
        strategy.push(STRATEGY_HIGH_BETA.to_string());
    }
    if rsi < 30.0 {
        strategy.push(STRATEGY_AVOID_ENTRIES.to_string());
    }
    if macd > signal {
        strategy.push(STRATEGY_TRADING_WINDOW.to_string());
    }

    if strategy.is_empty() {
        strategy.push(STRATEGY_NO_SIGNAL.to_string());
    }
    strategy
}

/// Round half to even at two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
