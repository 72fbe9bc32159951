// src/lib.rs
// 实时肌电/脑电手势识别：数据采集、训练与在线预测
pub mod config;
pub mod controller;
pub mod drivers;
pub mod error;
pub mod ml;
pub mod processing;
pub mod types;
