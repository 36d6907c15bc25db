/*!
# Canvas Marker Rendering

Draws a marker store onto a single bitmap surface and resolves pointer events
back to markers.

- [`surface`]: the [`Surface`] drawing target and the in-memory [`RasterSurface`]
- [`pipeline`]: viewport culling and redraw
- [`events`]: hit testing and click/hover dispatch
- [`layer`]: [`CanvasMarkerLayer`], which ties the pieces to a host view
*/

pub mod events;
pub mod layer;
pub mod pipeline;
pub mod surface;

pub use events::{hit_test, EventDispatcher, LayerHandler, PointerEvent, PointerKind};
pub use layer::{CanvasMarkerLayer, Layer};
pub use pipeline::{FrameGeometry, RedrawSummary, RenderPipeline, RenderState};
pub use surface::{RasterSurface, Surface, SurfaceTransform};
