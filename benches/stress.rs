use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};

async fn connect(host: &str, port: u16, password: &str) -> Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname("meetslot")
        .user("admin")
        .password(password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

/// Create and open a booking link; returns its token.
async fn armed_link(client: &Client) -> String {
    let messages = client
        .simple_query("INSERT INTO booking_links (name) VALUES ('Bench Guest')")
        .await
        .unwrap();
    let token = messages
        .iter()
        .find_map(|m| match m {
            SimpleQueryMessage::Row(row) => row.get("token").map(str::to_string),
            _ => None,
        })
        .expect("no token returned");
    client
        .batch_execute(&format!("SELECT * FROM link_access WHERE token = '{token}'"))
        .await
        .unwrap();
    token
}

/// A far-future slot inside default bookable hours, unlikely to repeat across runs.
fn random_slot() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}-{:02}-{:02} {:02}:{}",
        rng.gen_range(2090..2099),
        rng.gen_range(1..=12),
        rng.gen_range(1..=28),
        rng.gen_range(10..18),
        if rng.gen_bool(0.5) { "00" } else { "30" }
    )
}

fn booking_sql(token: &str, slot: &str) -> String {
    format!(
        "INSERT INTO link_bookings (token, name, email, phone, purpose, slot) \
         VALUES ('{token}', 'Bench Guest', 'bench@example.com', '010-0000-0000', 'Load test', '{slot}')"
    )
}

async fn phase1_sequential(host: &str, port: u16, password: &str) {
    let client = connect(host, port, password).await;

    let n = 1000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for _ in 0..n {
        let t = Instant::now();
        client
            .batch_execute("INSERT INTO booking_links (name) VALUES ('Bench Guest')")
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} links in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create link", &mut latencies);
}

/// Many clients race to book the same slot, each through its own link.
/// Exactly one booking per round may win.
async fn phase2_slot_race(host: &str, port: u16, password: &str) {
    let rounds = 20;
    let racers = 10;
    let mut violations = 0;
    let start = Instant::now();

    for _ in 0..rounds {
        let slot = random_slot();
        let wins = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..racers {
            let host = host.to_string();
            let password = password.to_string();
            let slot = slot.clone();
            let wins = wins.clone();
            handles.push(tokio::spawn(async move {
                let client = connect(&host, port, &password).await;
                let token = armed_link(&client).await;
                if client.batch_execute(&booking_sql(&token, &slot)).await.is_ok() {
                    wins.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        if wins.load(Ordering::Relaxed) > 1 {
            violations += 1;
        }
    }

    println!(
        "  {rounds} rounds x {racers} racers in {:.2}s, double bookings: {violations}",
        start.elapsed().as_secs_f64()
    );
}

async fn phase3_read_under_load(host: &str, port: u16, password: &str) {
    // Writers: create, open and book through links in the background
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for _ in 0..5 {
        let host = host.to_string();
        let password = password.to_string();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &password).await;
            while !stop.load(Ordering::Relaxed) {
                let token = armed_link(&client).await;
                let _ = client.batch_execute(&booking_sql(&token, &random_slot())).await;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 300;
    let mut reader_handles = Vec::new();

    for i in 0..n_readers {
        let host = host.to_string();
        let password = password.to_string();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &password).await;
            let sql = if i % 2 == 0 {
                "SELECT * FROM availability WHERE period = 'week'"
            } else {
                "SELECT * FROM availability_days WHERE period = 'month'"
            };
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                client.batch_execute(sql).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

async fn phase4_connection_storm(host: &str, port: u16, password: &str) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for _ in 0..n_conns {
        let host = host.to_string();
        let password = password.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &password).await;
            for _ in 0..ops_per_conn {
                client
                    .batch_execute("SELECT * FROM availability_days")
                    .await
                    .unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("MEETSLOT_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("MEETSLOT_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid MEETSLOT_PORT");
    let password =
        std::env::var("MEETSLOT_ADMIN_PASSWORD").expect("MEETSLOT_ADMIN_PASSWORD is required");

    println!("=== meetslot stress benchmark ===");
    println!("target: {host}:{port}\n");

    println!("[phase 1] sequential link creation");
    phase1_sequential(&host, port, &password).await;

    println!("\n[phase 2] concurrent bookings on one slot");
    phase2_slot_race(&host, port, &password).await;

    println!("\n[phase 3] availability latency under booking load");
    phase3_read_under_load(&host, port, &password).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&host, port, &password).await;

    println!("\n=== benchmark complete ===");
}
