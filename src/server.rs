use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

use crate::cpu::IRQ_VECTOR;
use crate::error::Result;
use crate::machine::Machine;
use crate::metrics::{gather_text, init_metrics, record_api_request, Timer};
use crate::snapshots::{CpuSnapshot, MachineSnapshot, SnapshotStore, SnapshotSummary};
use crate::sync::lock;

#[derive(Debug, Clone, Serialize)]
pub struct MachineState {
    pub cpu: CpuSnapshot,
    pub cycles: u64,
    pub running: bool,
    pub frequency_khz: u32,
    pub sync_millis: u32,
    pub ram8k: bool,
    pub write_in_rom: bool,
}

#[derive(Debug, Deserialize)]
pub struct IrqRequest {
    pub level: bool,
}

#[derive(Debug, Deserialize)]
pub struct SpeedRequest {
    pub frequency_khz: u32,
    pub sync_millis: u32,
}

#[derive(Debug, Deserialize)]
pub struct MemoryQuery {
    pub start: u16,
    pub end: u16,
}

#[derive(Debug, Serialize)]
pub struct MemoryData {
    pub start: u16,
    pub end: u16,
    /// Base64 encoded bytes
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct MemoryLoad {
    pub start: u16,
    pub data: String,
}

/// Saves `start..=end` to a file on the emulator host. `.bin` and `.rom`
/// are written raw, anything else as a hex dump.
#[derive(Debug, Deserialize)]
pub struct MemorySave {
    pub path: String,
    pub start: u16,
    pub end: u16,
}

#[derive(Debug, Deserialize)]
pub struct VectorRequest {
    pub address: u16,
}

#[derive(Debug, Deserialize)]
pub struct KeyboardInput {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ScreenData {
    pub text: String,
    pub cursor_column: usize,
    pub cursor_row: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotSaveRequest {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotLoadRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
struct AppState {
    machine: Arc<Machine>,
    snapshots: SnapshotStore,
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn respond<T: Serialize>(
    method: &str,
    endpoint: &str,
    timer: &Timer,
    status: StatusCode,
    response: &ApiResponse<T>,
) -> WithStatus<Json> {
    record_api_request(method, endpoint, status.as_u16(), timer.elapsed());
    warp::reply::with_status(warp::reply::json(response), status)
}

/// Any emulator error is reported as 400 with its message.
fn respond_result<T: Serialize>(
    method: &str,
    endpoint: &str,
    timer: &Timer,
    result: Result<T>,
) -> WithStatus<Json> {
    match result {
        Ok(data) => respond(method, endpoint, timer, StatusCode::OK, &ApiResponse::success(data)),
        Err(e) => {
            warn!("{} {} failed: {}", method, endpoint, e);
            respond::<T>(method, endpoint, timer, StatusCode::BAD_REQUEST, &ApiResponse::error(e.to_string()))
        }
    }
}

fn machine_state(machine: &Machine) -> MachineState {
    let runner = machine.runner();
    let (frequency_khz, sync_millis) = runner.speed();
    MachineState {
        cpu: runner.cpu_state(),
        cycles: runner.total_cycles(),
        running: runner.is_running(),
        frequency_khz,
        sync_millis,
        ram8k: machine.memory().ram8k(),
        write_in_rom: machine.memory().write_in_rom(),
    }
}

/// Every control route, CORS enabled and request-logged.
pub fn routes(
    machine: Arc<Machine>,
    snapshots: SnapshotStore,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let state = AppState { machine, snapshots };

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST", "DELETE"]);

    let get_state = warp::path("state")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(state_handler);

    let reset = warp::path("reset")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(reset_handler);

    let hard_reset = warp::path("hard-reset")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(hard_reset_handler);

    let nmi = warp::path("nmi")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(nmi_handler);

    let irq = warp::path("irq")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(irq_handler);

    let speed = warp::path("speed")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(speed_handler);

    let read_memory = warp::path("memory")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<MemoryQuery>())
        .and(with_state(state.clone()))
        .and_then(read_memory_handler);

    let load_memory = warp::path("memory")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(load_memory_handler);

    let save_memory = warp::path!("memory" / "save")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(save_memory_handler);

    let irq_vector = warp::path("irq-vector")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(irq_vector_handler);

    let keyboard = warp::path("keyboard")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(keyboard_handler);

    let screen = warp::path("screen")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(screen_handler);

    let snapshot = warp::path("snapshot")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(snapshot_handler);

    let restore = warp::path!("snapshot" / "restore")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(restore_handler);

    let save_snapshot = warp::path!("snapshot" / "save")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(save_snapshot_handler);

    let load_snapshot = warp::path!("snapshot" / "load")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(load_snapshot_handler);

    let delete_snapshot = warp::path!("snapshot" / String)
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(delete_snapshot_handler);

    let ram8k = warp::path!("settings" / "ram8k")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(ram8k_handler);

    let write_in_rom = warp::path!("settings" / "write-in-rom")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(write_in_rom_handler);

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(metrics_handler);

    get_state
        .or(reset)
        .or(hard_reset)
        .or(nmi)
        .or(irq)
        .or(speed)
        .or(read_memory)
        .or(load_memory)
        .or(save_memory)
        .or(irq_vector)
        .or(keyboard)
        .or(screen)
        .or(snapshot)
        .or(restore)
        .or(save_snapshot)
        .or(load_snapshot)
        .or(delete_snapshot)
        .or(ram8k)
        .or(write_in_rom)
        .or(metrics)
        .with(cors)
        .with(warp::log("apple1::api"))
}

/// Serves the control API until the runtime shuts down.
pub async fn serve(addr: SocketAddr, machine: Arc<Machine>, snapshots: SnapshotStore) {
    init_metrics();
    match warp::serve(routes(machine, snapshots)).try_bind_ephemeral(addr) {
        Ok((bound, server)) => {
            info!("Control server listening on http://{}", bound);
            server.await;
        }
        Err(e) => error!("Control server could not bind {}: {}", addr, e),
    }
}

async fn state_handler(state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let response = ApiResponse::success(machine_state(&state.machine));
    Ok(respond("GET", "/state", &timer, StatusCode::OK, &response))
}

async fn reset_handler(state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    state.machine.soft_reset();
    let response = ApiResponse::success(machine_state(&state.machine));
    Ok(respond("POST", "/reset", &timer, StatusCode::OK, &response))
}

async fn hard_reset_handler(state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    // Joins the CPU thread and reads ROM files, so keep it off the workers
    let machine = Arc::clone(&state.machine);
    let result = match tokio::task::spawn_blocking(move || machine.hard_reset()).await {
        Ok(result) => result.map(|()| machine_state(&state.machine)),
        Err(e) => {
            error!("Hard reset task failed: {}", e);
            let response: ApiResponse<MachineState> =
                ApiResponse::error("hard reset did not complete".to_string());
            return Ok(respond("POST", "/hard-reset", &timer, StatusCode::INTERNAL_SERVER_ERROR, &response));
        }
    };
    Ok(respond_result("POST", "/hard-reset", &timer, result))
}

async fn nmi_handler(state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    state.machine.runner().raise_nmi();
    let response = ApiResponse::success("NMI raised".to_string());
    Ok(respond("POST", "/nmi", &timer, StatusCode::OK, &response))
}

async fn irq_handler(
    request: IrqRequest,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    state.machine.runner().raise_irq(request.level);
    let message = format!("IRQ line {}", if request.level { "asserted" } else { "cleared" });
    Ok(respond("POST", "/irq", &timer, StatusCode::OK, &ApiResponse::success(message)))
}

async fn speed_handler(
    request: SpeedRequest,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let result = state
        .machine
        .runner()
        .set_speed(request.frequency_khz, request.sync_millis)
        .map(|()| machine_state(&state.machine));
    Ok(respond_result("POST", "/speed", &timer, result))
}

async fn read_memory_handler(
    query: MemoryQuery,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let result = state
        .machine
        .memory()
        .snapshot(query.start, query.end)
        .map(|bytes| MemoryData {
            start: query.start,
            end: query.end,
            data: STANDARD.encode(bytes),
        });
    Ok(respond_result("GET", "/memory", &timer, result))
}

async fn load_memory_handler(
    request: MemoryLoad,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let bytes = match STANDARD.decode(request.data.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            let response: ApiResponse<String> = ApiResponse::error(format!("invalid base64 data: {}", e));
            return Ok(respond("POST", "/memory", &timer, StatusCode::BAD_REQUEST, &response));
        }
    };
    let result = state
        .machine
        .memory()
        .load_image(&bytes, request.start)
        .map(|()| format!("Loaded {} bytes at ${:04X}", bytes.len(), request.start));
    Ok(respond_result("POST", "/memory", &timer, result))
}

async fn save_memory_handler(
    request: MemorySave,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let result = state
        .machine
        .save_file(Path::new(&request.path), request.start, request.end)
        .map(|()| format!("Saved ${:04X}-${:04X} to {}", request.start, request.end, request.path));
    Ok(respond_result("POST", "/memory/save", &timer, result))
}

/// Replies with the vector as it reads back, which is unchanged when the
/// ROM page is protected.
async fn irq_vector_handler(
    request: VectorRequest,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    state.machine.set_irq_brk_vector(request.address);
    let vector = state.machine.memory().read_u16(IRQ_VECTOR);
    Ok(respond("POST", "/irq-vector", &timer, StatusCode::OK, &ApiResponse::success(vector)))
}

async fn keyboard_handler(
    request: KeyboardInput,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let keyboard = state.machine.keyboard();
    keyboard.queue_text(&request.text);
    let response = ApiResponse::success(keyboard.pending());
    Ok(respond("POST", "/keyboard", &timer, StatusCode::OK, &response))
}

async fn screen_handler(state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let (cursor_column, cursor_row) = state.machine.cursor();
    let response = ApiResponse::success(ScreenData {
        text: state.machine.screen_text(),
        cursor_column,
        cursor_row,
    });
    Ok(respond("GET", "/screen", &timer, StatusCode::OK, &response))
}

async fn snapshot_handler(
    request: SnapshotRequest,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let name = request.name.unwrap_or_else(|| "snapshot".to_string());
    let snapshot = state.machine.snapshot(name);
    let summary = snapshot.summary();
    lock(&state.snapshots).insert(snapshot.id.clone(), snapshot);
    info!("Created snapshot \"{}\" ({})", summary.name, summary.id);
    Ok(respond("POST", "/snapshot", &timer, StatusCode::OK, &ApiResponse::success(summary)))
}

async fn restore_handler(
    request: RestoreRequest,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let snapshot = lock(&state.snapshots).get(&request.id).cloned();
    let Some(snapshot) = snapshot else {
        let response: ApiResponse<SnapshotSummary> =
            ApiResponse::error(format!("Snapshot {} not found", request.id));
        return Ok(respond("POST", "/snapshot/restore", &timer, StatusCode::NOT_FOUND, &response));
    };
    let result = state.machine.restore(&snapshot).map(|()| snapshot.summary());
    Ok(respond_result("POST", "/snapshot/restore", &timer, result))
}

async fn save_snapshot_handler(
    request: SnapshotSaveRequest,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let snapshot = lock(&state.snapshots).get(&request.id).cloned();
    let Some(snapshot) = snapshot else {
        let response: ApiResponse<SnapshotSummary> =
            ApiResponse::error(format!("Snapshot {} not found", request.id));
        return Ok(respond("POST", "/snapshot/save", &timer, StatusCode::NOT_FOUND, &response));
    };
    let result = snapshot
        .save_to_file(Path::new(&request.path))
        .map(|()| snapshot.summary());
    Ok(respond_result("POST", "/snapshot/save", &timer, result))
}

async fn load_snapshot_handler(
    request: SnapshotLoadRequest,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let result = MachineSnapshot::load_from_file(Path::new(&request.path)).map(|snapshot| {
        let summary = snapshot.summary();
        lock(&state.snapshots).insert(snapshot.id.clone(), snapshot);
        info!("Loaded snapshot \"{}\" ({}) from {}", summary.name, summary.id, request.path);
        summary
    });
    Ok(respond_result("POST", "/snapshot/load", &timer, result))
}

async fn delete_snapshot_handler(
    id: String,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    match lock(&state.snapshots).remove(&id) {
        Some(snapshot) => {
            let response = ApiResponse::success(snapshot.summary());
            Ok(respond("DELETE", "/snapshot/:id", &timer, StatusCode::OK, &response))
        }
        None => {
            let response: ApiResponse<SnapshotSummary> =
                ApiResponse::error(format!("Snapshot {} not found", id));
            Ok(respond("DELETE", "/snapshot/:id", &timer, StatusCode::NOT_FOUND, &response))
        }
    }
}

async fn ram8k_handler(
    request: ToggleRequest,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    state.machine.set_ram8k(request.enabled);
    let response = ApiResponse::success(machine_state(&state.machine));
    Ok(respond("POST", "/settings/ram8k", &timer, StatusCode::OK, &response))
}

async fn write_in_rom_handler(
    request: ToggleRequest,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    state.machine.set_write_in_rom(request.enabled);
    let response = ApiResponse::success(machine_state(&state.machine));
    Ok(respond("POST", "/settings/write-in-rom", &timer, StatusCode::OK, &response))
}

async fn metrics_handler() -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    match gather_text() {
        Ok(metrics_text) => {
            record_api_request("GET", "/metrics", 200, timer.elapsed());
            Ok(warp::reply::with_header(
                metrics_text,
                "content-type",
                "text/plain; version=0.0.4",
            ))
        }
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            record_api_request("GET", "/metrics", 500, timer.elapsed());
            Ok(warp::reply::with_header(
                "Error encoding metrics".to_string(),
                "content-type",
                "text/plain",
            ))
        }
    }
}
