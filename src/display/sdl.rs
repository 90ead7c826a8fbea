//! SDL2 Window Presenter
//! Shows the latest processed frame and puts the live metrics in the title bar.
//! Must stay on the thread that created the SDL context.

use color_eyre::{eyre::eyre, Result};
use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;
use tracing::{info, warn};

use super::Presenter;
use crate::capture::{Frame, PixelFormat};
use crate::detect::Detection;
use crate::pipeline::PipelineStatus;

pub struct Sdl2Presenter {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    status: String,
}

impl Sdl2Presenter {
    pub fn new(sdl_context: &sdl2::Sdl, width: u32, height: u32) -> Result<Self> {
        let video_subsystem = sdl_context.video().map_err(|e| eyre!(e))?;

        let window = video_subsystem
            .window("Argus", width, height)
            .position_centered()
            .resizable()
            .build()?;

        let canvas = window.into_canvas().present_vsync().build()?;
        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump().map_err(|e| eyre!(e))?;

        Ok(Self {
            canvas,
            texture_creator,
            event_pump,
            status: "Ready".to_string(),
        })
    }

    /// Drain window events; true once the user closed the window.
    pub fn quit_requested(&mut self) -> bool {
        let mut quit = false;
        for event in self.event_pump.poll_iter() {
            if let Event::Quit { .. } = event {
                info!("Quit event received");
                quit = true;
            }
        }
        quit
    }

    fn draw(&mut self, frame: &Frame) -> Result<()> {
        let (sdl_format, data, pitch) = match frame.meta.format {
            PixelFormat::Rgb24 => (PixelFormatEnum::RGB24, frame.data.to_vec(), frame.meta.stride),
            PixelFormat::Bgr24 => (PixelFormatEnum::BGR24, frame.data.to_vec(), frame.meta.stride),
            PixelFormat::Gray8 => {
                let rgb = frame
                    .to_rgb_image()
                    .ok_or_else(|| eyre!("frame {} has a short buffer", frame.sequence()))?;
                (PixelFormatEnum::RGB24, rgb.into_raw(), frame.width() * 3)
            }
        };

        let mut texture = self
            .texture_creator
            .create_texture_streaming(sdl_format, frame.width(), frame.height())
            .map_err(|e| eyre!(e))?;

        texture
            .update(None, &data, pitch as usize)
            .map_err(|e| eyre!(e))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| eyre!(e))?;

        self.canvas.present();
        Ok(())
    }
}

impl Presenter for Sdl2Presenter {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        average_fps: f64,
        efficiency_percent: f64,
    ) {
        if let Err(e) = self.draw(frame) {
            warn!("Failed to render frame {}: {}", frame.sequence(), e);
            return;
        }

        let title = format!(
            "Argus | FPS: {:.1} | Objects: {} | Efficiency: {:.1}% | {}",
            average_fps,
            detections.len(),
            efficiency_percent,
            self.status
        );
        if let Err(e) = self.canvas.window_mut().set_title(&title) {
            warn!("Failed to update window title: {}", e);
        }
    }

    fn status(&mut self, status: &PipelineStatus) {
        self.status = status.to_string();
        if !matches!(status, PipelineStatus::Running) {
            self.canvas.clear();
            self.canvas.present();
            let _ = self
                .canvas
                .window_mut()
                .set_title(&format!("Argus | {}", self.status));
        }
    }
}
