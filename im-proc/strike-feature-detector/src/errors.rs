pub type Result<M> = std::result::Result<M, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("GpuError({0})")]
    Gpu(#[from] gpu_imops::Error),
    #[error("FrameError({0})")]
    Frame(#[from] strike_types::FrameError),
}
